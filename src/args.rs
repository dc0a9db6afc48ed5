// Commandline argument parser using clap for gsrflow

use clap::Parser;

use crate::visualizer::VizConfig;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct VizArgs {
    /// Serial device the sensor board is attached to. When omitted, the
    /// available ports are listed and one can be picked interactively
    #[arg(short = 'd', long = "device")]
    pub device: Option<String>,

    /// Baud rate for the serial link
    #[arg(short = 'b', long = "baud", default_value_t = 115200)]
    pub baud: u32,

    /// Number of LEDs on the chain
    #[arg(short = 'n', long = "num-leds", default_value_t = 30)]
    pub num_leds: usize,

    /// Control loop period, in milliseconds
    #[arg(short = 'p', long = "period", default_value_t = 10)]
    pub loop_period_ms: u64,

    /// Duration of the startup calibration pass, in milliseconds
    #[arg(short = 'c', long = "calibration", default_value_t = 5000)]
    pub calibration_ms: u64,

    /// Smoothing factor for the exponential filter, in 0..=1
    #[arg(short = 'a', long = "alpha", default_value_t = 0.3)]
    pub alpha: f32,

    /// Group number selecting the trail color, clamped to 1..=5
    #[arg(short = 'g', long = "group", default_value_t = 1)]
    pub group: u8,

    /// Disable the slow adaptive drift of the display baseline
    #[arg(long = "fixed-baseline")]
    pub fixed_baseline: bool,
}

impl VizArgs {
    /// Folds the flags into a full pipeline configuration, leaving the
    /// untunable knobs at their defaults.
    pub fn to_config(&self) -> VizConfig {
        VizConfig {
            num_leds: self.num_leds,
            loop_period_ms: self.loop_period_ms,
            calibration_ms: self.calibration_ms,
            alpha: self.alpha,
            adaptive_baseline: !self.fixed_baseline,
            ..VizConfig::default()
        }
    }
}
