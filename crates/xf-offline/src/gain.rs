//! Crossfade position to linear gain pair

/// Linear gains for the two sources at a crossfade position
///
/// `-1.0` is all first source, `1.0` is all second source. Values outside
/// [-1, 1] are extrapolated along the same line, not clamped.
#[inline]
pub fn gains(crossfade: f64) -> (f64, f64) {
    (-(crossfade - 1.0) / 2.0, (crossfade + 1.0) / 2.0)
}

/// Crossfade position with its derived gains
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParameters {
    pub crossfade: f64,
}

impl MixParameters {
    pub fn new(crossfade: f64) -> Self {
        Self { crossfade }
    }

    /// Gain applied to the first source
    pub fn gain_first(&self) -> f64 {
        gains(self.crossfade).0
    }

    /// Gain applied to the second source
    pub fn gain_second(&self) -> f64 {
        gains(self.crossfade).1
    }
}

impl Default for MixParameters {
    fn default() -> Self {
        Self { crossfade: 0.0 }
    }
}
