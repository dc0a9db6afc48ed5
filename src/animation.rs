//! The LED animation engine: a mode state machine rendering full frames.
//!
//! One `LedMode` is active at a time; every iteration the engine dispatches
//! on it and produces a complete frame for the chain. The signal-driven
//! modes move a fading trail along the chain at a speed derived from the
//! filtered signal; the rest are host-selected patterns. A detected spike
//! overrides whatever mode is active with a flash frame.
//!
//! The calibration wash and the success flash live here too. The success
//! flash is one of the two deliberately blocking phases in the system; it
//! holds the loop for a fixed 1.2 s and nothing longer.

use crate::color::{clamp_group, group_color, color_wheel, Rgb};
use crate::led::LedStrip;
use std::thread;
use std::time::Duration;

/// Frame color rendered while a spike is active.
pub const SPIKE_FLASH: Rgb = Rgb::new(255, 100, 100);

/// Color of the calibration-success flash.
pub const SUCCESS_COLOR: Rgb = Rgb::new(0, 255, 0);

const FLASH_COUNT: u32 = 3;
const FLASH_STEP: Duration = Duration::from_millis(200);

/// The closed set of animation modes. Exactly one is active; transitions
/// happen only on host command or when simulation mode toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    /// Signal-driven trail. `downstream` reverses the travel direction.
    Gsr {
        /// Render direction along the chain.
        downstream: bool,
    },
    /// Whole chain filled with one host-specified color.
    Solid(Rgb),
    /// Sinusoidal white brightness oscillation.
    Pulse,
    /// Rotating per-pixel hue offset, independent of the sensor.
    Rainbow,
    /// All pixels cleared.
    Off,
}

/// Per-iteration inputs for the signal-driven modes.
#[derive(Debug, Clone, Copy)]
pub struct GsrDrive {
    /// Trail speed in LEDs per second (before the engine's 2x factor).
    pub speed: f32,
    /// Background glow intensity for unlit pixels, already in [0, 1].
    pub glow: f32,
}

/// Linear interpolation of `x` from one range onto another. Extrapolates;
/// callers clamp where the output must stay in range.
pub fn map_range(x: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    if (in_max - in_min).abs() < f32::EPSILON {
        return out_min;
    }
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Mode state machine plus the trail animation state.
#[derive(Debug, Clone)]
pub struct AnimationEngine {
    num_leds: usize,
    trail_length: f32,
    mode: LedMode,
    position: f32,
    last_update_ms: Option<u64>,
    rainbow_hue: u16,
    brightness: u8,
    group: u8,
}

impl AnimationEngine {
    /// Creates an engine for a chain of `num_leds` pixels with a trail of
    /// `trail_length` pixels.
    pub fn new(num_leds: usize, trail_length: f32) -> Self {
        Self {
            num_leds,
            trail_length,
            mode: LedMode::Gsr { downstream: false },
            position: 0.0,
            last_update_ms: None,
            rainbow_hue: 0,
            brightness: 255,
            group: 1,
        }
    }

    /// Currently active mode.
    pub fn mode(&self) -> LedMode {
        self.mode
    }

    /// Switches mode. Trail position carries over between the signal-driven
    /// variants.
    pub fn set_mode(&mut self, mode: LedMode) {
        self.mode = mode;
    }

    /// Global brightness, 0..=255, applied to every rendered frame.
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Sets the global brightness.
    pub fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    /// Device group index (1-based, already clamped).
    pub fn group(&self) -> u8 {
        self.group
    }

    /// Sets the device group, clamping into the palette range. Returns the
    /// clamped value.
    pub fn set_group(&mut self, group: i32) -> u8 {
        self.group = clamp_group(group);
        self.group
    }

    /// Current trail position, exposed for tests and the monitor.
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Number of pixels on the chain.
    pub fn num_leds(&self) -> usize {
        self.num_leds
    }

    /// Renders one frame. `spike_override` replaces the mode output with the
    /// flash frame while an artifact is active.
    pub fn render(&mut self, now_ms: u64, drive: GsrDrive, spike_override: bool) -> Vec<Rgb> {
        let dt = self.step_clock(now_ms);

        let frame = if spike_override {
            vec![SPIKE_FLASH; self.num_leds]
        } else {
            match self.mode {
                LedMode::Gsr { downstream } => self.render_gsr(downstream, drive, dt),
                LedMode::Solid(color) => vec![color; self.num_leds],
                LedMode::Pulse => self.render_pulse(now_ms),
                LedMode::Rainbow => self.render_rainbow(),
                LedMode::Off => vec![Rgb::BLACK; self.num_leds],
            }
        };

        self.apply_brightness(frame)
    }

    /// Pulsing white wash shown while calibration runs. Bypasses mode
    /// dispatch entirely.
    pub fn calibration_frame(&self, now_ms: u64) -> Vec<Rgb> {
        let pulse = ((now_ms as f32 / 300.0).sin() + 1.0) / 2.0;
        let level = (20.0 + 30.0 * pulse) as u8;
        vec![Rgb::new(level, level, level); self.num_leds]
    }

    fn step_clock(&mut self, now_ms: u64) -> f32 {
        let dt = match self.last_update_ms {
            Some(last) => now_ms.saturating_sub(last) as f32 / 1000.0,
            None => 0.0,
        };
        self.last_update_ms = Some(now_ms);
        dt
    }

    fn render_gsr(&mut self, downstream: bool, drive: GsrDrive, dt: f32) -> Vec<Rgb> {
        let chain = self.num_leds as f32;
        if downstream {
            self.position -= drive.speed * dt * 2.0;
            if self.position < -self.trail_length {
                self.position = chain + self.trail_length;
            }
        } else {
            self.position += drive.speed * dt * 2.0;
            if self.position > chain + self.trail_length {
                self.position = -self.trail_length;
            }
        }

        let base = group_color(self.group);
        (0..self.num_leds)
            .map(|i| {
                let distance = if downstream {
                    i as f32 - self.position
                } else {
                    self.position - i as f32
                };
                if (0.0..=self.trail_length).contains(&distance) {
                    let intensity = 1.0 - distance / self.trail_length;
                    base.scaled(intensity * intensity)
                } else {
                    base.scaled(drive.glow)
                }
            })
            .collect()
    }

    fn render_pulse(&self, now_ms: u64) -> Vec<Rgb> {
        let pulse = ((now_ms as f32 / 300.0).sin() + 1.0) / 2.0;
        let level = (20.0 + 200.0 * pulse) as u8;
        vec![Rgb::new(level, level, level); self.num_leds]
    }

    fn render_rainbow(&mut self) -> Vec<Rgb> {
        let frame = (0..self.num_leds)
            .map(|i| {
                let pixel_hue = self
                    .rainbow_hue
                    .wrapping_add((i as u32 * 65536 / self.num_leds as u32) as u16);
                color_wheel((pixel_hue >> 8) as u8)
            })
            .collect();
        self.rainbow_hue = self.rainbow_hue.wrapping_add(256);
        frame
    }

    fn apply_brightness(&self, frame: Vec<Rgb>) -> Vec<Rgb> {
        if self.brightness == 255 {
            return frame;
        }
        let scale = self.brightness as f32 / 255.0;
        frame.into_iter().map(|px| px.scaled(scale)).collect()
    }
}

/// Triple green flash marking calibration success.
///
/// Blocks for exactly `FLASH_COUNT * 2 * FLASH_STEP` (1.2 s). This and the
/// calibration pass are the only blocking phases in the system.
pub fn flash_success(strip: &mut dyn LedStrip, num_leds: usize) {
    let on = vec![SUCCESS_COLOR; num_leds];
    let off = vec![Rgb::BLACK; num_leds];
    for _ in 0..FLASH_COUNT {
        strip.push_frame(&on);
        thread::sleep(FLASH_STEP);
        strip.push_frame(&off);
        thread::sleep(FLASH_STEP);
    }
}
