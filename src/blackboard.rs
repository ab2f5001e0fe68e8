use parking_lot::RwLock;
use std::sync::Arc;

/// Simulated board: what the console sets and what the drive last wrote.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub knob_raw: u16,
    pub button_pressed: bool,
    pub open_duty: u16,
    pub close_duty: u16,
    pub quit: bool,
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn new_board(knob_raw: u16) -> Blackboard {
    Arc::new(RwLock::new(State {
        knob_raw,
        ..State::default()
    }))
}

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn set_knob(bb: &Blackboard, raw: u16) {
    bb.write().knob_raw = raw;
}

pub fn set_button(bb: &Blackboard, pressed: bool) {
    bb.write().button_pressed = pressed;
}

pub fn request_quit(bb: &Blackboard) {
    bb.write().quit = true;
}

pub fn quit_requested(bb: &Blackboard) -> bool {
    bb.read().quit
}
