mod blackboard;   // simulated board state shared with the console
mod bus;          // broadcast topic for console lines
mod config;       // bench settings (config/default.toml + overrides)
mod console;      // stdin task
mod hardware;     // host implementations of the board peripherals

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use spin_sleep::SpinSleeper;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{self, EnvFilter};
use valve_control::{
    Boot, CalibrationProgress, Channel, Clock, ControlConfig, CycleOutcome, EraseWindow,
    EraseWindowStatus, HBridge, ValveController,
};

use blackboard::{Blackboard, new_board, quit_requested, snapshot};
use bus::Topic;
use crate::config::{BenchSettings, load_settings};
use hardware::{FileEeprom, HostClock, SimButton, SimPwmChannel, SimSensor};

type BenchController = ValveController<
    SimSensor,
    HBridge<SimPwmChannel, SimPwmChannel>,
    SimButton,
    FileEeprom,
    HostClock,
>;

type Lines = Receiver<Arc<String>>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Valve actuator bench started.");
    let settings = load_settings()?;

    let tokio_rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    let bb: Blackboard = new_board(settings.bench.initial_knob);
    let line_topic: Topic<String> = Topic::new(16);
    let mut lines = line_topic.subscribe();

    tokio_rt.spawn({
        let bb = Arc::clone(&bb);
        let sensor_max = settings.controller.sensor_max;
        async move {
            if let Err(e) = console::console_task(Arc::clone(&bb), line_topic, sensor_max).await {
                error!("Console task failed: {:?}", e);
                blackboard::request_quit(&bb);
            }
        }
    });

    let result = run(&settings.bench, settings.controller, &bb, &mut lines);

    // The console may be parked on a blocking stdin read.
    tokio_rt.shutdown_background();
    result
}

fn run(
    bench: &BenchSettings,
    controller_config: ControlConfig,
    bb: &Blackboard,
    lines: &mut Lines,
) -> anyhow::Result<()> {
    let eeprom = FileEeprom::open(&bench.eeprom_path, bench.eeprom_size)?;
    info!(path = %eeprom.path().display(), size = bench.eeprom_size, "EEPROM image ready");

    let drive = HBridge::new(
        SimPwmChannel::new(Arc::clone(bb), Channel::Open),
        SimPwmChannel::new(Arc::clone(bb), Channel::Close),
    )
    .context("initializing H-bridge")?;

    let mut controller: BenchController = ValveController::new(
        controller_config,
        SimSensor::new(Arc::clone(bb)),
        drive,
        SimButton::new(Arc::clone(bb)),
        eeprom,
        HostClock::new(),
    )
    .context("building valve controller")?;

    let sleeper = SpinSleeper::new(1_000);
    let period = Duration::from_millis(bench.cycle_period_ms);

    if !erase_window(&mut controller, bench, bb, lines, &sleeper, period)? {
        return Ok(());
    }

    match controller.load().context("loading persistent state")? {
        Boot::Ready(bounds) => info!(%bounds, "Calibration loaded."),
        Boot::NeedsCalibration(reason) => {
            warn!(%reason, "No valid calibration, starting calibration.");
            if !calibrate(&mut controller, bb, lines, &sleeper, period)? {
                return Ok(());
            }
        }
    }

    control_loop(&mut controller, bench, bb, lines, &sleeper, period)
}

/// Boot-time factory reset. Returns `false` if the bench should stop.
fn erase_window(
    controller: &mut BenchController,
    bench: &BenchSettings,
    bb: &Blackboard,
    lines: &mut Lines,
    sleeper: &SpinSleeper,
    period: Duration,
) -> anyhow::Result<bool> {
    let mut window = EraseWindow::open(controller.clock().now(), bench.erase_window_ms());
    loop {
        if quit_requested(bb) {
            return Ok(false);
        }
        let now = controller.clock().now();
        let status = match bus::poll(lines) {
            Some(line) => {
                let status = window.feed_line(&line, now);
                if status == EraseWindowStatus::Open {
                    info!(remaining_ms = window.remaining(now), "not an erase command, continuing boot window");
                }
                status
            }
            None => window.poll(now),
        };
        match status {
            EraseWindowStatus::Open => sleeper.sleep(period),
            EraseWindowStatus::Expired => return Ok(true),
            EraseWindowStatus::EraseRequested => {
                controller.erase_store().context("erasing persistent storage")?;
                warn!("Persistent storage erased. Restart to recalibrate.");
                return Ok(false);
            }
        }
    }
}

/// Two-step calibration driven by console lines. Returns `false` if the bench should stop.
fn calibrate(
    controller: &mut BenchController,
    bb: &Blackboard,
    lines: &mut Lines,
    sleeper: &SpinSleeper,
    period: Duration,
) -> anyhow::Result<bool> {
    let mut wizard = controller.calibration_wizard();
    while let Some(prompt) = wizard.prompt() {
        info!("{}", prompt);
        loop {
            if quit_requested(bb) {
                return Ok(false);
            }
            if bus::poll(lines).is_some() {
                break;
            }
            sleeper.sleep(period);
        }

        match controller
            .confirm_calibration_step(&mut wizard)
            .context("calibration step")?
        {
            CalibrationProgress::Captured(raw) => info!(raw, "Closed end captured."),
            CalibrationProgress::Complete(bounds) => info!(%bounds, "Calibration complete."),
            CalibrationProgress::Rejected(reason) => {
                warn!(%reason, "Calibration rejected, starting over.")
            }
        }
    }
    Ok(true)
}

fn control_loop(
    controller: &mut BenchController,
    bench: &BenchSettings,
    bb: &Blackboard,
    lines: &mut Lines,
    sleeper: &SpinSleeper,
    period: Duration,
) -> anyhow::Result<()> {
    info!("Control loop started.");
    let mut cycle: u64 = 0;
    let mut last_current = controller.state().current;

    while !quit_requested(bb) {
        while let Some(line) = bus::poll(lines) {
            debug!(line = %line, "ignoring console line while running");
        }

        let report = controller.run_cycle().context("control cycle")?;
        debug!(%report, outcome = ?report.outcome);

        if report.outcome == CycleOutcome::Overridden {
            info!(%report, "Override complete.");
        } else if cycle % u64::from(bench.status_every) == 0 || report.current != last_current {
            let board = snapshot(bb);
            info!(
                open_duty = board.open_duty,
                close_duty = board.close_duty,
                "{}",
                report
            );
        }
        last_current = report.current;
        cycle += 1;

        sleeper.sleep(period);
    }

    info!(cycles = cycle, "Control loop stopped.");
    Ok(())
}
