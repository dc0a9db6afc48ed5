//! Baseline establishment and slow adaptation.
//!
//! The baseline is the user's resting signal level. It is established once
//! by a timed calibration pass (`Calibration`) and then carried by a
//! `BaselineTracker`, which also maintains two companions: a very slowly
//! adapting baseline used for display normalization, and a short-term
//! baseline used by the combined-signal calculation that drives animation
//! speed. Neither companion feeds the affect estimate.

use crate::error::ConfigError;
use crate::filter::SENSOR_MAX;

/// Where the pipeline is in its calibration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// No baseline exists; all downstream processing is inert.
    Uncalibrated,
    /// The timed calibration pass is running.
    Calibrating,
    /// A baseline exists and the pipeline is live.
    Calibrated,
}

/// Observed raw-signal bounds, padded for display headroom.
///
/// Created once at calibration completion and never mutated afterward. Used
/// only to normalize the filtered signal into a display scale.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    /// Padded lower bound.
    pub min: u16,
    /// Padded upper bound.
    pub max: u16,
}

impl Range {
    /// Pads observed bounds by `margin` on each side, clamped to the sensor
    /// range.
    pub fn padded(observed_min: u16, observed_max: u16, margin: u16) -> Self {
        Self {
            min: observed_min.saturating_sub(margin),
            max: observed_max.saturating_add(margin).min(SENSOR_MAX),
        }
    }

    /// Width of the range as a float.
    pub fn span(&self) -> f32 {
        (self.max - self.min) as f32
    }
}

/// Accumulator for one timed calibration pass.
///
/// The caller owns the clock: it decides when to record samples (gated by
/// `wants_sample`) and when the pass is over (`is_complete`), then calls
/// `finish` to produce the result. Keeping time external makes the exact
/// sample arithmetic testable without sleeping.
#[derive(Debug)]
pub struct Calibration {
    started_ms: u64,
    duration_ms: u64,
    sub_interval_ms: u64,
    last_sample_ms: Option<u64>,
    sum: u64,
    count: u32,
    min: u16,
    max: u16,
}

/// Output of a completed calibration pass.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationResult {
    /// Arithmetic mean of every raw sample seen. Never padded.
    pub baseline: f32,
    /// Padded min/max bounds for display normalization.
    pub range: Range,
}

impl Calibration {
    /// Begins a pass at `now_ms` lasting `duration_ms`, sampling every
    /// `sub_interval_ms`.
    pub fn new(now_ms: u64, duration_ms: u64, sub_interval_ms: u64) -> Self {
        Self {
            started_ms: now_ms,
            duration_ms,
            sub_interval_ms,
            last_sample_ms: None,
            sum: 0,
            count: 0,
            min: SENSOR_MAX,
            max: 0,
        }
    }

    /// True when enough time has passed since the last recorded sample.
    pub fn wants_sample(&self, now_ms: u64) -> bool {
        match self.last_sample_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.sub_interval_ms,
        }
    }

    /// Records one raw sample.
    pub fn record(&mut self, raw: u16, now_ms: u64) {
        self.sum += raw as u64;
        self.count += 1;
        self.min = self.min.min(raw);
        self.max = self.max.max(raw);
        self.last_sample_ms = Some(now_ms);
    }

    /// True once the configured wall-clock duration has elapsed.
    pub fn is_complete(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_ms) >= self.duration_ms
    }

    /// Number of samples recorded so far.
    pub fn sample_count(&self) -> u32 {
        self.count
    }

    /// Produces the baseline and padded range.
    ///
    /// Fails if the pass recorded no samples at all, which indicates a
    /// misconfigured duration rather than anything recoverable at runtime.
    pub fn finish(self, range_margin: u16) -> Result<CalibrationResult, ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::EmptyCalibration);
        }
        Ok(CalibrationResult {
            baseline: self.sum as f32 / self.count as f32,
            range: Range::padded(self.min, self.max, range_margin),
        })
    }
}

/// The established baseline plus its adaptive companions.
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    baseline: f32,
    adaptive: f32,
    short_term: f32,
    range: Range,
}

impl BaselineTracker {
    /// Builds a tracker from a completed calibration. Both companions start
    /// at the calibrated baseline.
    pub fn from_calibration(result: CalibrationResult) -> Self {
        Self {
            baseline: result.baseline,
            adaptive: result.baseline,
            short_term: result.baseline,
            range: result.range,
        }
    }

    /// The calibrated baseline. Affect values are computed relative to this.
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// The slowly adapting display baseline.
    pub fn adaptive(&self) -> f32 {
        self.adaptive
    }

    /// The padded display range.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Blends the adaptive baseline toward the current filtered value with a
    /// very small coefficient, so it follows electrode/skin drift but not
    /// fast emotional responses.
    pub fn update_adaptive(&mut self, ema: f32, beta: f32) {
        self.adaptive = self.adaptive * (1.0 - beta) + ema * beta;
    }

    /// Rebases the baseline and both companions to the current filtered
    /// value, discarding calibration history. Used by the host RESET.
    pub fn rebase(&mut self, ema: f32) {
        self.baseline = ema;
        self.adaptive = ema;
        self.short_term = ema;
    }

    /// Deviation from the adaptive baseline, normalized into [0, 1] against
    /// a scale derived from the calibrated range.
    pub fn normalized_deviation(&self, ema: f32) -> f32 {
        let deviation = ema - self.adaptive;
        let scale = (self.range.span() * 0.3).max(50.0);
        (deviation / scale + 0.5).clamp(0.0, 1.0)
    }

    /// Blends normalized deviation, scaled derivative, and short-term
    /// deviation into a single [0, 1] drive signal, amplifying small changes
    /// with a sub-linear power curve.
    ///
    /// Also advances the adaptive and short-term baselines; call once per
    /// live (non-simulated) iteration.
    pub fn combined_signal(&mut self, ema: f32, derivative: f32, adaptive_beta: f32) -> f32 {
        self.update_adaptive(ema, adaptive_beta);
        let normalized = self.normalized_deviation(ema);

        self.short_term = self.short_term * 0.98 + ema * 0.02;
        let short_scale = (self.range.span() * 0.1).max(20.0);
        let short_term_deviation = (ema - self.short_term) / short_scale;

        let combined = normalized * 0.4
            + (derivative / 10.0 + 0.5) * 0.3
            + (short_term_deviation + 0.5) * 0.3;

        combined.clamp(0.0, 1.0).powf(0.7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_samples_average_exactly() {
        // 5000 ms at one sample per 100 ms: 50 samples. Constructed so the
        // sum is 51000 and the mean is exactly 1020.0.
        let mut cal = Calibration::new(0, 5000, 100);
        let mut now = 0;
        let mut pushed = 0;
        while !cal.is_complete(now) {
            if cal.wants_sample(now) {
                cal.record(1020, now);
                pushed += 1;
            }
            now += 10;
        }
        assert_eq!(pushed, 50);
        assert_eq!(cal.sample_count(), 50);

        let result = cal.finish(50).unwrap();
        assert_eq!(result.baseline, 1020.0);
        // Padding applies to the range only, never to the baseline.
        assert_eq!(result.range.min, 970);
        assert_eq!(result.range.max, SENSOR_MAX);
    }

    #[test]
    fn empty_calibration_is_a_config_error() {
        let cal = Calibration::new(0, 0, 100);
        assert!(cal.finish(50).is_err());
    }

    #[test]
    fn range_padding_clamps_to_sensor_bounds() {
        let range = Range::padded(20, 1000, 50);
        assert_eq!(range.min, 0);
        assert_eq!(range.max, SENSOR_MAX);
    }

    #[test]
    fn rebase_moves_all_three_baselines() {
        let mut tracker = BaselineTracker::from_calibration(CalibrationResult {
            baseline: 500.0,
            range: Range::padded(400, 600, 50),
        });
        tracker.update_adaptive(800.0, 0.5);
        tracker.rebase(650.0);
        assert_eq!(tracker.baseline(), 650.0);
        assert_eq!(tracker.adaptive(), 650.0);
    }

    #[test]
    fn adaptive_baseline_follows_slow_drift_only() {
        let mut tracker = BaselineTracker::from_calibration(CalibrationResult {
            baseline: 500.0,
            range: Range::padded(400, 600, 50),
        });
        tracker.update_adaptive(600.0, 0.001);
        // One step moves the baseline by beta * deviation = 0.1 units.
        assert!((tracker.adaptive() - 500.1).abs() < 1e-3);
    }

    #[test]
    fn normalized_deviation_is_centered_and_clamped() {
        let tracker = BaselineTracker::from_calibration(CalibrationResult {
            baseline: 500.0,
            range: Range::padded(400, 600, 50),
        });
        assert!((tracker.normalized_deviation(500.0) - 0.5).abs() < 1e-6);
        assert_eq!(tracker.normalized_deviation(10_000.0), 1.0);
        assert_eq!(tracker.normalized_deviation(-10_000.0), 0.0);
    }
}
