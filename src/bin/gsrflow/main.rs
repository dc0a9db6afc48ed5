//! Headless gsrflow runtime.
//!
//! Runs the full pipeline at a fixed period against a simulated sensor and
//! speaks the line protocol over a serial port: commands come in from the
//! host, status and telemetry lines go back out. Rendered frames go nowhere
//! (there is no chain attached to a host process); use the `monitor` binary
//! to see them.

use clap::Parser;
use gsrflow::{
    args::VizArgs,
    led::{LedStrip, NullStrip},
    protocol::LineAssembler,
    sensor::{DummyGsr, GsrSensor},
    visualizer::{GsrVisualizer, HostAction},
};

use log::{info, warn};
use serial2::SerialPort;
use spin_sleep::SpinSleeper;
use std::{
    io::{self, Write},
    sync::{mpsc, Arc},
    thread::spawn,
    time::{Duration, Instant},
};

// Example:
// cargo run --bin gsrflow -- --device /dev/ttyACM0 --num-leds 30 --group 2

fn main() {
    env_logger::init();
    let args = VizArgs::parse();

    let device_name = match &args.device {
        Some(name) => name.clone(),
        None => prompt_for_device(),
    };

    // Open the requested port and set its read timeout to infinity
    // (well, about 584,942,417,355 years, which is close enough)
    let mut port = SerialPort::open(device_name.trim(), args.baud).expect("Failed to open port");
    port.set_read_timeout(Duration::MAX)
        .expect("Failed to set read timeout");
    let port = Arc::new(port);

    let mut viz = GsrVisualizer::new(args.to_config());
    viz.set_group(args.group as i32);
    let mut sensor = DummyGsr::default();
    let mut strip = NullStrip;

    // Reader thread: assemble complete lines off the port and hand them to
    // the control loop over a channel.
    let (line_tx, line_rx) = mpsc::channel::<String>();
    let reader_port = Arc::clone(&port);
    let _reader = spawn(move || {
        let mut buffer = [0; 256];
        let mut assembler = LineAssembler::new();
        loop {
            let read_len = match (&*reader_port).read(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    warn!("serial read failed, stopping reader: {e}");
                    return;
                }
            };
            for &byte in buffer.iter().take(read_len) {
                if let Some(line) = assembler.push_byte(byte) {
                    if line_tx.send(line).is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut link = &*port;
    viz.calibrate(&mut sensor, &mut strip, &mut link)
        .expect("Calibration failed");
    info!("calibrated, entering control loop");

    let sleeper = SpinSleeper::default();
    let period = Duration::from_millis(viz.config().loop_period_ms);
    let epoch = Instant::now();
    loop {
        let now_ms = epoch.elapsed().as_millis() as u64;

        let mut recalibrate = false;
        for line in line_rx.try_iter() {
            let outcome = viz.handle_line(&line);
            for reply in &outcome.lines {
                write_line(&mut link, reply);
            }
            if outcome.action == Some(HostAction::Recalibrate) {
                recalibrate = true;
            }
        }
        if recalibrate {
            viz.calibrate(&mut sensor, &mut strip, &mut link)
                .expect("Recalibration failed");
            continue;
        }

        let update = viz.tick(sensor.read(), now_ms);
        for line in &update.lines {
            write_line(&mut link, line);
        }
        if let Some(frame) = update.frame {
            strip.push_frame(&frame);
        }

        sleeper.sleep(period);
    }
}

/// Lists the available serial devices and reads a choice from stdin.
fn prompt_for_device() -> String {
    let available_ports = SerialPort::available_ports().expect("Failed to get available ports");
    println!("Available devices:");
    for port in available_ports {
        println!("\t{}", port.to_string_lossy());
    }
    println!("Enter the device name: ");
    let mut device_name = String::new();
    io::stdin()
        .read_line(&mut device_name)
        .expect("Failed to read line");
    device_name
}

fn write_line(link: &mut &SerialPort, line: &str) {
    if let Err(e) = writeln!(link, "{line}") {
        warn!("failed to write {line:?} to the host: {e}");
    }
}
