//! The sensor input contract and a synthetic stand-in.
//!
//! A `GsrSensor` is a single analog channel producing integer readings in
//! the device-native 0..=1023 range, polled once per loop iteration. The
//! `DummyGsr` lets the whole pipeline (calibration included) run with no
//! hardware attached: it wanders slowly like a resting skin-conductance
//! trace and occasionally throws a decaying artifact so spike handling gets
//! exercised too.

use crate::filter::SENSOR_MAX;
use rand::prelude::*;

/// A single analog GSR channel.
pub trait GsrSensor {
    /// Reads the current raw value, 0..=1023.
    fn read(&mut self) -> u16;
}

/// Synthetic GSR source: slow random walk plus rare spike artifacts.
#[derive(Debug)]
pub struct DummyGsr {
    level: f32,
    artifact: f32,
    wander: f32,
    artifact_chance: f64,
}

impl DummyGsr {
    /// Creates a source resting near `level`.
    pub fn new(level: f32) -> Self {
        Self {
            level: level.clamp(0.0, SENSOR_MAX as f32),
            artifact: 0.0,
            wander: 1.5,
            artifact_chance: 0.002,
        }
    }

    /// Sets the per-read random-walk step size.
    pub fn set_wander(&mut self, wander: f32) {
        self.wander = wander.max(0.0);
    }

    /// Sets the per-read probability of injecting a spike artifact. Zero
    /// disables artifacts entirely.
    pub fn set_artifact_chance(&mut self, chance: f64) {
        self.artifact_chance = chance.clamp(0.0, 1.0);
    }
}

impl Default for DummyGsr {
    fn default() -> Self {
        Self::new(512.0)
    }
}

impl GsrSensor for DummyGsr {
    fn read(&mut self) -> u16 {
        let mut rng = thread_rng();

        self.level += rng.gen_range(-self.wander..=self.wander);
        self.level = self.level.clamp(0.0, SENSOR_MAX as f32);

        if self.artifact_chance > 0.0 && rng.gen_bool(self.artifact_chance) {
            self.artifact += rng.gen_range(80.0..200.0);
        }
        // Artifacts die out over a few dozen reads.
        self.artifact *= 0.9;
        if self.artifact < 1.0 {
            self.artifact = 0.0;
        }

        (self.level + self.artifact).clamp(0.0, SENSOR_MAX as f32) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_in_sensor_range() {
        let mut sensor = DummyGsr::new(1000.0);
        for _ in 0..5000 {
            assert!(sensor.read() <= SENSOR_MAX);
        }
    }

    #[test]
    fn quiet_sensor_stays_near_its_level() {
        let mut sensor = DummyGsr::new(512.0);
        sensor.set_wander(0.0);
        sensor.set_artifact_chance(0.0);
        for _ in 0..100 {
            assert_eq!(sensor.read(), 512);
        }
    }
}
