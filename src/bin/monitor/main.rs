mod gui;

use gsrflow::led::MemoryStrip;
use gsrflow::sensor::DummyGsr;
use gsrflow::visualizer::{GsrVisualizer, VizConfig};
use gui::engage_gui;

fn main() {
    env_logger::init();

    // A short calibration pass keeps startup snappy; the real 5 s default
    // only matters against a real wearer.
    let config = VizConfig {
        calibration_ms: 1000,
        calibration_interval_ms: 50,
        ..VizConfig::default()
    };
    let mut viz = GsrVisualizer::new(config);
    let mut sensor = DummyGsr::default();
    let mut strip = MemoryStrip::new();

    let mut transcript = Vec::new();
    if let Err(e) = viz.calibrate(&mut sensor, &mut strip, &mut transcript) {
        eprintln!("calibration failed: {e}");
        return;
    }
    let startup_lines = String::from_utf8_lossy(&transcript)
        .lines()
        .map(str::to_owned)
        .collect();

    if let Err(e) = engage_gui(viz, sensor, strip, startup_lines) {
        eprintln!("{e:?}");
    }
}
