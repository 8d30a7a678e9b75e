/// Cycles per second the grid starts at (120 BPM).
pub const DEFAULT_CPS: f64 = 2.0;

pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Linear mapping from wall-clock time to beats.
///
/// The grid is anchored at `(anchor_time_micros, anchor_beat)` and advances by
/// `cps` beats every second from there. Both anchor fields are only ever
/// replaced together, through [`TempoState::retimed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoState {
    pub cps: f64,
    pub anchor_time_micros: i64,
    pub anchor_beat: f64,
}

impl TempoState {
    pub fn new(cps: f64, anchor_time_micros: i64, anchor_beat: f64) -> Self {
        Self {
            cps,
            anchor_time_micros,
            anchor_beat,
        }
    }

    /// Grid used at server launch: beat 0 at `now_micros`, [`DEFAULT_CPS`].
    pub fn at_launch(now_micros: i64) -> Self {
        Self::new(DEFAULT_CPS, now_micros, 0.0)
    }

    /// Beat count at `now_micros`, extrapolated from the anchor.
    pub fn beat_at(&self, now_micros: i64) -> f64 {
        let elapsed_secs = (now_micros - self.anchor_time_micros) as f64 / MICROS_PER_SECOND;
        self.anchor_beat + elapsed_secs * self.cps
    }

    /// Returns the grid re-anchored at `now_micros` with a new rate.
    ///
    /// The beat at `now_micros` is computed under the current rate, so the
    /// grid is continuous across the change.
    pub fn retimed(&self, new_cps: f64, now_micros: i64) -> Self {
        Self::new(new_cps, now_micros, self.beat_at(now_micros))
    }
}
