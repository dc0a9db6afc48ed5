//! Long-horizon affect estimation with outlier trimming.
//!
//! Baseline-relative values accumulate in a fixed-capacity ring. On a fixed
//! wall-clock interval (not a sample count) the window recomputes a trimmed
//! mean: entries deviating from the window mean by more than two standard
//! deviations are excluded, then the mean is taken again. The delta between
//! consecutive trimmed means is kept as a trend indicator.

use log::debug;

/// A freshly computed affect estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectEstimate {
    /// Trimmed mean of the window, relative to baseline.
    pub value: f32,
    /// Change since the previous estimate. Only meaningful once the window
    /// has wrapped at least once.
    pub trend: f32,
}

/// Circular buffer of baseline-relative values plus the periodic estimate.
#[derive(Debug, Clone)]
pub struct AffectWindow {
    buf: Vec<f32>,
    index: usize,
    total_samples: u64,
    interval_ms: u64,
    last_compute_ms: Option<u64>,
    affect: Option<f32>,
    trend: f32,
}

impl AffectWindow {
    /// Creates a window holding `capacity` samples, recomputing every
    /// `interval_ms` of wall-clock time.
    pub fn new(capacity: usize, interval_ms: u64) -> Self {
        assert!(capacity > 0, "affect window must have capacity");
        Self {
            buf: vec![0.0; capacity],
            index: 0,
            total_samples: 0,
            interval_ms,
            last_compute_ms: None,
            affect: None,
            trend: 0.0,
        }
    }

    /// Writes one baseline-relative value, overwriting the oldest entry once
    /// the buffer is full.
    pub fn push(&mut self, baseline_relative: f32) {
        self.buf[self.index] = baseline_relative;
        self.index = (self.index + 1) % self.buf.len();
        self.total_samples += 1;
    }

    /// Number of valid entries (bounded by capacity).
    pub fn len(&self) -> usize {
        self.total_samples.min(self.buf.len() as u64) as usize
    }

    /// True before any sample has been pushed.
    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// True once the ring has overwritten old entries at least once, i.e.
    /// the trend compares two fully populated windows.
    pub fn has_wrapped(&self) -> bool {
        self.total_samples >= self.buf.len() as u64
    }

    /// Latest affect estimate, if one has been computed.
    pub fn affect(&self) -> Option<f32> {
        self.affect
    }

    /// Latest trend (delta of consecutive estimates).
    pub fn trend(&self) -> f32 {
        self.trend
    }

    /// Recomputes the estimate if the interval has elapsed. Returns the new
    /// estimate when one was produced.
    pub fn maybe_compute(&mut self, now_ms: u64) -> Option<AffectEstimate> {
        match self.last_compute_ms {
            None => {
                // First call anchors the interval clock.
                self.last_compute_ms = Some(now_ms);
                None
            }
            Some(last) if now_ms.saturating_sub(last) >= self.interval_ms => {
                self.last_compute_ms = Some(now_ms);
                self.compute()
            }
            Some(_) => None,
        }
    }

    /// Unconditional recompute over the valid portion of the buffer.
    fn compute(&mut self) -> Option<AffectEstimate> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        let valid = &self.buf[..n];

        let mean = valid.iter().sum::<f32>() / n as f32;
        let variance = valid.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32;
        let std_dev = variance.sqrt();

        // Trim anything beyond two standard deviations of the window mean.
        let limit = 2.0 * std_dev;
        let kept: Vec<f32> = valid
            .iter()
            .copied()
            .filter(|v| (v - mean).abs() <= limit)
            .collect();

        if kept.is_empty() {
            // Degenerate window: keep the previous estimate rather than
            // dividing by zero.
            return None;
        }

        let trimmed_mean = kept.iter().sum::<f32>() / kept.len() as f32;
        self.trend = match self.affect {
            Some(prev) => trimmed_mean - prev,
            None => 0.0,
        };
        self.affect = Some(trimmed_mean);

        debug!(
            "affect recomputed: {:.2} (trend {:+.2}, kept {}/{})",
            trimmed_mean,
            self.trend,
            kept.len(),
            n
        );

        Some(AffectEstimate {
            value: trimmed_mean,
            trend: self.trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with(values: &[f32]) -> AffectWindow {
        let mut w = AffectWindow::new(values.len().max(1), 1000);
        for &v in values {
            w.push(v);
        }
        w
    }

    #[test]
    fn trimmed_mean_equals_plain_mean_without_outliers() {
        // All samples within 2 sigma of the mean: nothing is trimmed.
        let mut w = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let est = w.compute().unwrap();
        assert!((est.value - 3.0).abs() < 1e-6);
    }

    #[test]
    fn outlier_beyond_two_sigma_is_excluded() {
        // 30 near-zero samples and one >= 5 sigma outlier.
        let mut values = vec![0.0; 15];
        values.extend(vec![1.0; 15]);
        values.push(100.0);
        let mut w = window_with(&values);

        let est = w.compute().unwrap();
        // Plain mean would be pulled toward ~3.7; the trimmed mean must
        // stay at the inlier mean of 0.5.
        assert!((est.value - 0.5).abs() < 1e-4);
    }

    #[test]
    fn zero_variance_window_keeps_every_sample() {
        let mut w = window_with(&[2.0; 10]);
        let est = w.compute().unwrap();
        assert_eq!(est.value, 2.0);
    }

    #[test]
    fn trend_is_delta_of_consecutive_estimates() {
        let mut w = AffectWindow::new(4, 1000);
        for _ in 0..4 {
            w.push(1.0);
        }
        w.compute();
        for _ in 0..4 {
            w.push(3.0);
        }
        let est = w.compute().unwrap();
        assert!((est.value - 3.0).abs() < 1e-6);
        assert!((est.trend - 2.0).abs() < 1e-6);
        assert!(w.has_wrapped());
    }

    #[test]
    fn interval_gating_is_wall_clock_not_sample_count() {
        let mut w = AffectWindow::new(8, 5000);
        w.push(1.0);
        assert!(w.maybe_compute(0).is_none()); // anchors the clock
        for t in [100, 1000, 4999] {
            w.push(1.0);
            assert!(w.maybe_compute(t).is_none());
        }
        w.push(1.0);
        assert!(w.maybe_compute(5000).is_some());
    }

    #[test]
    fn ring_overwrites_oldest_when_full() {
        let mut w = AffectWindow::new(3, 1000);
        for v in [10.0, 20.0, 30.0, 40.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        // Oldest (10.0) was overwritten; mean over {40, 20, 30} is 30.
        let est = w.compute().unwrap();
        assert!((est.value - 30.0).abs() < 1e-6);
    }
}
