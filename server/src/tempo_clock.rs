//! The relay's single tempo grid

use log::{info, warn};
use shared::TempoState;

/// Owner of the shared tempo grid
///
/// All mutation goes through [`TempoClock::apply_tempo_change`], which takes
/// `&mut self`: the beat at the change instant is read and the new anchor is
/// written without any other reader or writer in between.
#[derive(Debug, Clone)]
pub struct TempoClock {
    state: TempoState,
}

impl TempoClock {
    pub fn new(state: TempoState) -> Self {
        let clock = Self { state };
        clock.log_state();
        clock
    }

    /// Grid starting at the default rate with beat 0 at `now_micros`
    pub fn starting_at(now_micros: i64) -> Self {
        Self::new(TempoState::at_launch(now_micros))
    }

    pub fn state(&self) -> TempoState {
        self.state
    }

    pub fn current_beat(&self, now_micros: i64) -> f64 {
        self.state.beat_at(now_micros)
    }

    /// Re-anchors the grid at `now_micros` with `new_cps` and returns the
    /// new state. Any rate is accepted, including zero and negative ones.
    pub fn apply_tempo_change(&mut self, new_cps: f64, now_micros: i64) -> TempoState {
        if new_cps <= 0.0 || !new_cps.is_finite() {
            warn!("accepting unusual tempo of {} CPS", new_cps);
        }

        self.state = self.state.retimed(new_cps, now_micros);
        self.log_state();
        self.state
    }

    fn log_state(&self) {
        info!(
            "tempo at {} is {} CPS (beat={})",
            self.state.anchor_time_micros, self.state.cps, self.state.anchor_beat
        );
    }
}
