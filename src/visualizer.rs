//! The visualizer context: one struct owning every pipeline stage.
//!
//! All state lives here and is threaded explicitly through `tick` and the
//! command dispatcher; there is no ambient/static mutable state, so several
//! independent instances can run side by side (the tests do exactly that).
//!
//! A control-loop iteration is: read one raw sample, `tick` it (filtering,
//! spike detection, affect accumulation, frame rendering, telemetry), push
//! the frame, and write any pending lines. Calibration is the separate,
//! deliberately blocking `calibrate` pass.

use std::io::Write;
use std::time::{Duration, Instant};

use log::{debug, warn};
use spin_sleep::SpinSleeper;

use crate::affect::AffectWindow;
use crate::animation::{flash_success, map_range, AnimationEngine, GsrDrive, LedMode};
use crate::baseline::{BaselineTracker, Calibration, CalibrationPhase, CalibrationResult};
use crate::color::Rgb;
use crate::error::ConfigError;
use crate::filter::{FilterChain, FilteredSample, SENSOR_MAX};
use crate::led::LedStrip;
use crate::protocol::{status_line, telemetry_line, Command, Status};
use crate::sensor::GsrSensor;
use crate::spike::{SpikeConfig, SpikeDetector};

/// Tunable constants for a visualizer instance.
#[derive(Debug, Clone)]
pub struct VizConfig {
    /// Pixels on the LED chain.
    pub num_leds: usize,
    /// Trail length for the signal-driven modes, in pixels.
    pub trail_length: f32,
    /// Control loop period in milliseconds.
    pub loop_period_ms: u64,
    /// Calibration pass duration.
    pub calibration_ms: u64,
    /// Interval between calibration samples.
    pub calibration_interval_ms: u64,
    /// Moving-average window length in samples.
    pub ma_window: usize,
    /// Exponential filter smoothing factor.
    pub alpha: f32,
    /// Whether the display baseline adapts over time.
    pub adaptive_baseline: bool,
    /// Blend coefficient for the adaptive baseline.
    pub adaptive_beta: f32,
    /// Spike detection tunables.
    pub spike: SpikeConfig,
    /// Affect window capacity in samples (~30 s at the loop rate).
    pub affect_capacity: usize,
    /// Wall-clock interval between affect recomputations.
    pub affect_interval_ms: u64,
    /// Cadence of the periodic `{"ema":..}` telemetry frame.
    pub telemetry_interval_ms: u64,
    /// Padding applied to the observed calibration min/max.
    pub range_margin: u16,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            num_leds: 30,
            trail_length: 5.0,
            loop_period_ms: 10,
            calibration_ms: 5000,
            calibration_interval_ms: 100,
            ma_window: 10,
            alpha: 0.3,
            adaptive_baseline: true,
            adaptive_beta: 0.001,
            spike: SpikeConfig::default(),
            affect_capacity: 3000,
            affect_interval_ms: 5000,
            telemetry_interval_ms: 100,
            range_margin: 50,
        }
    }
}

/// Something the runner must do on the visualizer's behalf, because it owns
/// the sensor, the strip, and the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    /// Re-run the blocking calibration pass.
    Recalibrate,
}

/// Result of dispatching one host command.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Status lines to write immediately.
    pub lines: Vec<String>,
    /// Follow-up work for the runner.
    pub action: Option<HostAction>,
}

/// Result of one control-loop iteration.
#[derive(Debug)]
pub struct TickUpdate {
    /// Full frame for the chain, absent while uncalibrated.
    pub frame: Option<Vec<Rgb>>,
    /// Telemetry lines to write (at most one pending line by design).
    pub lines: Vec<String>,
}

/// The whole pipeline behind one explicit context object.
pub struct GsrVisualizer {
    config: VizConfig,
    filters: FilterChain,
    tracker: Option<BaselineTracker>,
    phase: CalibrationPhase,
    spikes: SpikeDetector,
    affect: AffectWindow,
    engine: AnimationEngine,
    simulation: bool,
    simulated_ema: f32,
    last_sample: Option<FilteredSample>,
    last_telemetry_ms: Option<u64>,
}

impl GsrVisualizer {
    /// Builds an uncalibrated visualizer. Nothing is rendered or aggregated
    /// until a calibration pass completes.
    pub fn new(config: VizConfig) -> Self {
        Self {
            filters: FilterChain::new(config.ma_window, config.alpha),
            tracker: None,
            phase: CalibrationPhase::Uncalibrated,
            spikes: SpikeDetector::new(config.spike),
            affect: AffectWindow::new(config.affect_capacity, config.affect_interval_ms),
            engine: AnimationEngine::new(config.num_leds, config.trail_length),
            simulation: false,
            simulated_ema: 0.0,
            last_sample: None,
            last_telemetry_ms: None,
            config,
        }
    }

    /// Runs the blocking calibration pass: samples the sensor on the
    /// configured sub-interval for the configured duration while showing the
    /// pulsing wash, then adopts the resulting baseline, flashes success,
    /// and reports readiness. Bounded by `calibration_ms` plus the fixed
    /// flash duration.
    pub fn calibrate(
        &mut self,
        sensor: &mut dyn GsrSensor,
        strip: &mut dyn LedStrip,
        out: &mut dyn Write,
    ) -> Result<(), ConfigError> {
        writeln!(out, "{}", status_line(Status::Calibrating))?;
        self.phase = CalibrationPhase::Calibrating;

        let mut calibration = Calibration::new(
            0,
            self.config.calibration_ms,
            self.config.calibration_interval_ms,
        );
        let started = Instant::now();
        let sleeper = SpinSleeper::default();
        loop {
            let now_ms = started.elapsed().as_millis() as u64;
            if calibration.is_complete(now_ms) {
                break;
            }
            if calibration.wants_sample(now_ms) {
                calibration.record(sensor.read(), now_ms);
            }
            strip.push_frame(&self.engine.calibration_frame(now_ms));
            sleeper.sleep(Duration::from_millis(self.config.loop_period_ms));
        }

        let result = match calibration.finish(self.config.range_margin) {
            Ok(result) => result,
            Err(e) => {
                self.phase = CalibrationPhase::Uncalibrated;
                return Err(e);
            }
        };
        debug!(
            "calibration complete: baseline {:.1}, range {}..{}",
            result.baseline, result.range.min, result.range.max
        );
        self.adopt_calibration(result);

        writeln!(out, "{}", status_line(Status::CalibrationComplete))?;
        flash_success(strip, self.config.num_leds);
        writeln!(out, "{}", status_line(Status::Ready))?;
        Ok(())
    }

    /// Installs a completed calibration, resetting every downstream stage.
    fn adopt_calibration(&mut self, result: CalibrationResult) {
        self.tracker = Some(BaselineTracker::from_calibration(result));
        self.phase = CalibrationPhase::Calibrated;
        self.filters = FilterChain::new(self.config.ma_window, self.config.alpha);
        self.spikes = SpikeDetector::new(self.config.spike);
        self.affect = AffectWindow::new(
            self.config.affect_capacity,
            self.config.affect_interval_ms,
        );
        self.last_sample = None;
        self.last_telemetry_ms = None;
    }

    /// Parses and dispatches one complete line from the host. Unrecognized
    /// lines are dropped (logged, never surfaced to the host, never fatal).
    pub fn handle_line(&mut self, line: &str) -> CommandOutcome {
        match line.parse::<Command>() {
            Ok(command) => self.handle_command(command),
            Err(e) => {
                warn!("dropping unparseable command {line:?}: {e}");
                CommandOutcome::default()
            }
        }
    }

    /// Applies one typed command to the pipeline state.
    pub fn handle_command(&mut self, command: Command) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();
        match command {
            Command::Calibrate => {
                outcome.action = Some(HostAction::Recalibrate);
            }
            Command::Reset => match (&mut self.tracker, self.last_sample) {
                (Some(tracker), Some(sample)) => {
                    tracker.rebase(sample.ema);
                    outcome.lines.push(status_line(Status::ResetComplete));
                }
                _ => warn!("RESET before calibration; nothing to rebase"),
            },
            Command::Group(group) => {
                let clamped = self.engine.set_group(group as i32);
                outcome
                    .lines
                    .push(status_line(Status::GroupChanged(clamped)));
            }
            Command::ToggleSimulation => {
                self.simulation = !self.simulation;
                if self.simulation {
                    self.engine.set_mode(LedMode::Gsr { downstream: true });
                    outcome.lines.push(status_line(Status::SimulationOn));
                } else {
                    self.engine.set_mode(LedMode::Gsr { downstream: false });
                    outcome.lines.push(status_line(Status::SimulationOff));
                }
            }
            Command::InjectEma(value) => {
                // The stored value always updates; it only drives the
                // animation while simulation is on.
                self.simulated_ema = value;
                if self.simulation {
                    self.engine.set_mode(LedMode::Gsr { downstream: true });
                }
            }
            Command::LedOff => self.engine.set_mode(LedMode::Off),
            Command::LedRainbow => self.engine.set_mode(LedMode::Rainbow),
            Command::LedPulse => self.engine.set_mode(LedMode::Pulse),
            Command::LedGsr => self.engine.set_mode(LedMode::Gsr { downstream: false }),
            Command::LedColor(color) => self.engine.set_mode(LedMode::Solid(color)),
            Command::Brightness(brightness) => self.engine.set_brightness(brightness),
            Command::Ping => outcome.lines.push(status_line(Status::Pong)),
        }
        outcome
    }

    /// Processes one raw sample: the whole per-iteration pipeline.
    ///
    /// Before calibration this is a no-op; after it, it filters, updates
    /// spike state, conditionally feeds the affect window, renders a frame,
    /// and emits telemetry on its cadence.
    pub fn tick(&mut self, raw: u16, now_ms: u64) -> TickUpdate {
        let Some(tracker) = self.tracker.as_mut() else {
            return TickUpdate {
                frame: None,
                lines: Vec::new(),
            };
        };

        let sample = self.filters.push(raw);
        self.last_sample = Some(sample);

        let in_spike = self.spikes.update(sample.ema, now_ms);
        if !in_spike {
            // Spikes are rejected artifacts; they never reach the
            // long-horizon estimate.
            self.affect.push(sample.ema - tracker.baseline());
        }
        self.affect.maybe_compute(now_ms);

        let range = tracker.range();
        let glow = map_range(
            sample.ema,
            range.min as f32,
            range.max as f32,
            0.02,
            0.15,
        )
        .clamp(0.02, 0.15);

        let speed = if self.simulation {
            map_range(self.simulated_ema, 0.0, SENSOR_MAX as f32, 0.5, 8.0).clamp(0.5, 8.0)
        } else {
            let beta = if self.config.adaptive_baseline {
                self.config.adaptive_beta
            } else {
                0.0
            };
            let signal = tracker.combined_signal(sample.ema, sample.derivative, beta);
            0.2 + signal * 7.8
        };

        let frame = self
            .engine
            .render(now_ms, GsrDrive { speed, glow }, in_spike);

        let mut lines = Vec::new();
        let telemetry_due = match self.last_telemetry_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.telemetry_interval_ms,
        };
        if telemetry_due {
            self.last_telemetry_ms = Some(now_ms);
            lines.push(telemetry_line(sample.ema));
        }

        TickUpdate {
            frame: Some(frame),
            lines,
        }
    }

    /// Where the pipeline is in its calibration lifecycle.
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Latest filtered value, if any sample has been processed.
    pub fn ema(&self) -> Option<f32> {
        self.last_sample.map(|s| s.ema)
    }

    /// Latest affect estimate.
    pub fn affect(&self) -> Option<f32> {
        self.affect.affect()
    }

    /// Latest affect trend.
    pub fn affect_trend(&self) -> f32 {
        self.affect.trend()
    }

    /// Whether a spike is currently active.
    pub fn in_spike(&self) -> bool {
        self.spikes.in_spike()
    }

    /// Whether simulation mode is on.
    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    /// Read access to the animation engine (mode, group, brightness).
    pub fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    /// The configuration this instance runs with.
    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    /// Selects the group palette entry, clamping to the valid range.
    pub fn set_group(&mut self, group: i32) -> u8 {
        self.engine.set_group(group)
    }

    /// Raises or lowers the exponential smoothing factor at runtime.
    pub fn set_exponential_alpha(&mut self, alpha: f32) {
        self.filters.set_alpha(alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Range;
    use crate::led::MemoryStrip;
    use crate::sensor::DummyGsr;

    fn calibrated() -> GsrVisualizer {
        let mut viz = GsrVisualizer::new(VizConfig::default());
        viz.adopt_calibration(CalibrationResult {
            baseline: 500.0,
            range: Range::padded(400, 600, 50),
        });
        viz
    }

    #[test]
    fn inert_until_calibrated() {
        let mut viz = GsrVisualizer::new(VizConfig::default());
        let update = viz.tick(512, 0);
        assert!(update.frame.is_none());
        assert!(update.lines.is_empty());
        assert_eq!(viz.phase(), CalibrationPhase::Uncalibrated);
    }

    #[test]
    fn color_command_round_trips_into_mode_state() {
        let mut viz = calibrated();
        viz.handle_line("LED:COLOR:10,20,30");
        assert_eq!(
            viz.engine().mode(),
            LedMode::Solid(Rgb::new(10, 20, 30))
        );
    }

    #[test]
    fn brightness_clamps_both_ways() {
        let mut viz = calibrated();
        viz.handle_line("BRIGHTNESS:999");
        assert_eq!(viz.engine().brightness(), 255);
        viz.handle_line("BRIGHTNESS:-5");
        assert_eq!(viz.engine().brightness(), 0);
    }

    #[test]
    fn group_changes_are_clamped_and_acknowledged() {
        let mut viz = calibrated();
        let outcome = viz.handle_line("GROUP:7");
        assert_eq!(viz.engine().group(), 5);
        assert_eq!(outcome.lines, vec![r#"{"status":"GROUP_CHANGED_TO_5"}"#]);
        viz.handle_line("GROUP:0");
        assert_eq!(viz.engine().group(), 1);
    }

    #[test]
    fn ping_answers_pong() {
        let mut viz = calibrated();
        let outcome = viz.handle_line("PING");
        assert_eq!(outcome.lines, vec![r#"{"status":"PONG"}"#]);
    }

    #[test]
    fn unknown_commands_are_silently_dropped() {
        let mut viz = calibrated();
        let outcome = viz.handle_line("FROBNICATE:9000");
        assert!(outcome.lines.is_empty());
        assert!(outcome.action.is_none());
    }

    #[test]
    fn calibrate_command_defers_to_the_runner() {
        let mut viz = calibrated();
        let outcome = viz.handle_line("CALIBRATE");
        assert_eq!(outcome.action, Some(HostAction::Recalibrate));
    }

    #[test]
    fn reset_rebases_to_current_filtered_value() {
        let mut viz = calibrated();
        for t in 0..50 {
            viz.tick(700, t * 10);
        }
        let ema = viz.ema().unwrap();
        let outcome = viz.handle_line("RESET");
        assert_eq!(outcome.lines, vec![r#"{"status":"RESET_COMPLETE"}"#]);
        // Baseline followed the signal: a flat post-reset stream makes the
        // affect input zero-relative again.
        viz.tick(700, 600);
        assert!((viz.ema().unwrap() - ema).abs() < 20.0);
    }

    #[test]
    fn simulation_drives_speed_from_injected_value() {
        let mut viz = calibrated();
        let outcome = viz.handle_line("sim");
        assert_eq!(outcome.lines, vec![r#"{"status":"SIMULATION_ON"}"#]);
        assert!(viz.is_simulation());
        assert_eq!(viz.engine().mode(), LedMode::Gsr { downstream: true });

        viz.handle_line(r#"{"ema":500.0}"#);
        viz.tick(500, 0); // anchors the animation clock
        let before = viz.engine().position();
        viz.tick(500, 100);
        let moved = before - viz.engine().position(); // downstream decreases

        // Speed comes from the injected 500.0, not the live sensor value.
        let expected_speed = 0.5 + 500.0 / 1023.0 * 7.5;
        assert!((moved - expected_speed * 0.1 * 2.0).abs() < 0.01);
    }

    #[test]
    fn simulation_off_reverts_to_live_dispatch() {
        let mut viz = calibrated();
        viz.handle_line("sim");
        viz.handle_line(r#"{"ema":1000.0}"#);
        let outcome = viz.handle_line("sim");
        assert_eq!(outcome.lines, vec![r#"{"status":"SIMULATION_OFF"}"#]);
        assert_eq!(viz.engine().mode(), LedMode::Gsr { downstream: false });

        // Live, flat-at-baseline signal: position advances forward now.
        viz.tick(500, 0);
        let before = viz.engine().position();
        viz.tick(500, 1000);
        assert!(viz.engine().position() > before);
    }

    #[test]
    fn injection_while_live_does_not_switch_modes() {
        let mut viz = calibrated();
        viz.handle_line("LED:PULSE");
        viz.handle_line(r#"{"ema":800.0}"#);
        assert_eq!(viz.engine().mode(), LedMode::Pulse);
    }

    #[test]
    fn telemetry_follows_its_cadence() {
        let mut viz = calibrated();
        let first = viz.tick(500, 0);
        assert_eq!(first.lines, vec![r#"{"ema":500.00}"#]);
        assert!(viz.tick(500, 50).lines.is_empty());
        let next = viz.tick(500, 100);
        assert_eq!(next.lines, vec![r#"{"ema":500.00}"#]);
    }

    #[test]
    fn spike_samples_stay_out_of_the_affect_window() {
        let mut viz = calibrated();
        viz.tick(500, 0);
        viz.tick(900, 10); // delta far above threshold: spike
        assert!(viz.in_spike());
        // Window holds only the clean first sample.
        assert_eq!(viz.affect.len(), 1);
    }

    #[test]
    fn blocking_calibration_pass_produces_a_baseline() {
        let config = VizConfig {
            calibration_ms: 100,
            calibration_interval_ms: 20,
            loop_period_ms: 5,
            ..VizConfig::default()
        };
        let mut viz = GsrVisualizer::new(config);
        let mut sensor = DummyGsr::new(512.0);
        sensor.set_wander(0.0);
        sensor.set_artifact_chance(0.0);
        let mut strip = MemoryStrip::new();
        let mut out = Vec::new();

        viz.calibrate(&mut sensor, &mut strip, &mut out).unwrap();

        assert_eq!(viz.phase(), CalibrationPhase::Calibrated);
        let transcript = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"status":"CALIBRATING"}"#,
                r#"{"status":"CALIBRATION_COMPLETE"}"#,
                r#"{"status":"READY"}"#,
            ]
        );
        // The wash and the success flash both reached the strip.
        assert!(strip.frames_pushed() > 6);
        // Flat input calibrates to exactly the resting level.
        viz.tick(512, 0);
        assert_eq!(viz.ema(), Some(512.0));
    }
}
