//! Transient artifact ("spike") detection on the filtered signal.
//!
//! A spike is a short-lived jump in the filtered value, usually electrode
//! noise rather than a real response. While one is active the animation
//! engine renders a flash override and the affect aggregator skips the
//! sample. A spike always ends: either the signal recovers toward its
//! pre-spike level or the maximum duration runs out.

/// Tunables for spike detection.
#[derive(Debug, Clone, Copy)]
pub struct SpikeConfig {
    /// Absolute per-update EMA delta that enters spike state.
    pub threshold: f32,
    /// Fraction of the onset deviation the signal must return within to
    /// count as recovered.
    pub recovery_fraction: f32,
    /// Hard upper bound on spike duration, so a signal that plateaus at a
    /// new level cannot leave the flag stuck.
    pub max_duration_ms: u64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            recovery_fraction: 0.3,
            max_duration_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveSpike {
    onset_ms: u64,
    /// Filtered value from just before the spike began.
    pre_spike_value: f32,
    /// Deviation from the pre-spike value, captured once at onset. Recovery
    /// is measured against this fixed target even if the signal keeps
    /// drifting during the spike.
    onset_deviation: f32,
}

/// Rate-of-change spike detector with hysteresis.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
    last_value: Option<f32>,
    active: Option<ActiveSpike>,
}

impl SpikeDetector {
    /// Creates a detector with the given tunables.
    pub fn new(config: SpikeConfig) -> Self {
        Self {
            config,
            last_value: None,
            active: None,
        }
    }

    /// Feeds one filtered value; returns whether a spike is active after
    /// this update.
    pub fn update(&mut self, filtered: f32, now_ms: u64) -> bool {
        let Some(last) = self.last_value else {
            self.last_value = Some(filtered);
            return false;
        };

        match self.active {
            None => {
                let delta = (filtered - last).abs();
                if delta > self.config.threshold {
                    self.active = Some(ActiveSpike {
                        onset_ms: now_ms,
                        pre_spike_value: last,
                        onset_deviation: delta,
                    });
                }
            }
            Some(spike) => {
                let deviation = (filtered - spike.pre_spike_value).abs();
                let recovered =
                    deviation <= spike.onset_deviation * self.config.recovery_fraction;
                let expired =
                    now_ms.saturating_sub(spike.onset_ms) >= self.config.max_duration_ms;
                if recovered || expired {
                    self.active = None;
                }
            }
        }

        self.last_value = Some(filtered);
        self.active.is_some()
    }

    /// Whether a spike is currently active.
    pub fn in_spike(&self) -> bool {
        self.active.is_some()
    }
}
