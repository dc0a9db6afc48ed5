//! The cascaded filter chain that smooths the raw GSR stream.
//!
//! Two independent smoothers run over the same raw samples: a fixed-length
//! moving average (ring buffer with an incrementally maintained running sum)
//! and an exponential low-pass filter. Both are O(1) per sample and both
//! seed themselves from the first sample they see, so neither exhibits a
//! warm-up transient toward zero.

/// Largest raw reading the sensor ADC can produce.
pub const SENSOR_MAX: u16 = 1023;

/// Fixed-length moving average over the raw stream.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    readings: Vec<u32>,
    index: usize,
    total: u64,
    primed: bool,
}

impl MovingAverage {
    /// Creates a moving average over a window of `window` samples.
    ///
    /// `window` must be at least 1.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "moving average window must be non-empty");
        Self {
            readings: vec![0; window],
            index: 0,
            total: 0,
            primed: false,
        }
    }

    /// Pushes a raw sample and returns the average over the current window.
    ///
    /// The first sample fills the whole window so the average starts at the
    /// signal level instead of climbing up from zero.
    pub fn push(&mut self, raw: u16) -> f32 {
        if !self.primed {
            self.readings.fill(raw as u32);
            self.total = raw as u64 * self.readings.len() as u64;
            self.primed = true;
            return raw as f32;
        }

        self.total -= self.readings[self.index] as u64;
        self.readings[self.index] = raw as u32;
        self.total += raw as u64;
        self.index = (self.index + 1) % self.readings.len();

        self.total as f32 / self.readings.len() as f32
    }
}

/// Recursive exponential low-pass: `out = alpha*raw + (1-alpha)*prev`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialFilter {
    alpha: f32,
    value: Option<f32>,
}

impl ExponentialFilter {
    /// Creates a filter with the given smoothing factor, clamped to [0, 1].
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Changes the smoothing factor, clamped to [0, 1]. Raising it (e.g. to
    /// 0.5) makes the output track fast changes more closely.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    /// Current smoothing factor.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Pushes a raw sample and returns the filtered value.
    pub fn push(&mut self, raw: f32) -> f32 {
        let next = match self.value {
            None => raw,
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    /// Most recent output, if any sample has been seen.
    pub fn value(&self) -> Option<f32> {
        self.value
    }
}

/// One iteration's worth of smoothed signal.
#[derive(Debug, Clone, Copy)]
pub struct FilteredSample {
    /// Exponential-filter output.
    pub ema: f32,
    /// Independently windowed moving average of the same raw stream.
    pub moving_avg: f32,
    /// Per-update change of the EMA (current minus previous output).
    pub derivative: f32,
}

/// Both smoothers bundled behind a single `push`.
#[derive(Debug, Clone)]
pub struct FilterChain {
    moving: MovingAverage,
    exponential: ExponentialFilter,
    last_ema: Option<f32>,
}

impl FilterChain {
    /// Builds a chain with a moving-average window of `window` samples and
    /// an exponential smoothing factor of `alpha`.
    pub fn new(window: usize, alpha: f32) -> Self {
        Self {
            moving: MovingAverage::new(window),
            exponential: ExponentialFilter::new(alpha),
            last_ema: None,
        }
    }

    /// Pushes a raw sensor reading through both smoothers.
    pub fn push(&mut self, raw: u16) -> FilteredSample {
        let moving_avg = self.moving.push(raw);
        let ema = self.exponential.push(raw as f32);
        let derivative = match self.last_ema {
            Some(prev) => ema - prev,
            None => 0.0,
        };
        self.last_ema = Some(ema);
        FilteredSample {
            ema,
            moving_avg,
            derivative,
        }
    }

    /// Most recent EMA output, if any sample has been seen.
    pub fn ema(&self) -> Option<f32> {
        self.last_ema
    }

    /// Adjusts the exponential smoothing factor.
    pub fn set_alpha(&mut self, alpha: f32) {
        self.exponential.set_alpha(alpha);
    }
}
