//! Stdin console for the bench.
//!
//! Bench commands drive the simulated board directly. Anything else is a line
//! for the controller (erase command, calibration confirmation) and goes out
//! on the line topic.

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::blackboard::{Blackboard, request_quit, set_button, set_knob};
use crate::bus::Topic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pot(u16),
    Press,
    Release,
    Quit,
    Line(String),
}

impl Command {
    pub fn parse(line: &str, sensor_max: u16) -> anyhow::Result<Command> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some("pot") => {
                let value = words.next().context("usage: pot <raw>")?;
                let raw: u16 = value
                    .parse()
                    .with_context(|| format!("'{}' is not a raw reading", value))?;
                if raw > sensor_max {
                    bail!("reading {} exceeds sensor maximum {}", raw, sensor_max);
                }
                Command::Pot(raw)
            }
            Some("press") => Command::Press,
            Some("release") => Command::Release,
            Some("quit") => Command::Quit,
            _ => return Ok(Command::Line(line.to_string())),
        };
        if words.next().is_some() {
            bail!("unexpected arguments in '{}'", line.trim());
        }
        Ok(command)
    }
}

/// Read stdin until EOF or `quit`.
pub async fn console_task(
    bb: Blackboard,
    lines: Topic<String>,
    sensor_max: u16,
) -> anyhow::Result<()> {
    info!("Console ready: pot <raw> | press | release | quit");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = stdin.next_line().await.context("reading stdin")? {
        match Command::parse(&line, sensor_max) {
            Ok(Command::Pot(raw)) => {
                set_knob(&bb, raw);
                info!(raw, "knob moved");
            }
            Ok(Command::Press) => {
                set_button(&bb, true);
                info!("button pressed");
            }
            Ok(Command::Release) => {
                set_button(&bb, false);
                info!("button released");
            }
            Ok(Command::Quit) => {
                request_quit(&bb);
                return Ok(());
            }
            Ok(Command::Line(line)) => lines.publish(line),
            Err(e) => warn!("{:#}", e),
        }
    }

    info!("stdin closed, stopping bench");
    request_quit(&bb);
    Ok(())
}
