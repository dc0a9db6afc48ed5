//! Terminal view of the running pipeline: the LED chain as a row of colored
//! blocks, the filtered signal as a scrolling chart, and the line protocol's
//! output as a log. Keys inject the same text commands a serial host would
//! send, so this doubles as a protocol playground.

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};

use gsrflow::led::{LedStrip, MemoryStrip};
use gsrflow::sensor::{DummyGsr, GsrSensor};
use gsrflow::visualizer::{GsrVisualizer, HostAction};

/// Seconds of signal history kept on the chart.
const CHART_WINDOW_S: f64 = 30.0;
const LOG_CAPACITY: usize = 100;

struct App {
    viz: GsrVisualizer,
    sensor: DummyGsr,
    strip: MemoryStrip,
    epoch: Instant,
    ema_history: Vec<(f64, f64)>,
    log: Vec<String>,
    group: u8,
    mode_index: usize,
}

/// Mode-cycling order for the 'm' key.
const MODE_COMMANDS: [&str; 4] = ["LED:GSR", "LED:RAINBOW", "LED:PULSE", "LED:OFF"];

impl App {
    fn new(
        viz: GsrVisualizer,
        sensor: DummyGsr,
        strip: MemoryStrip,
        startup_lines: Vec<String>,
    ) -> App {
        let group = viz.engine().group();
        App {
            viz,
            sensor,
            strip,
            epoch: Instant::now(),
            ema_history: vec![],
            log: startup_lines,
            group,
            mode_index: 0,
        }
    }

    fn on_tick(&mut self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let raw = self.sensor.read();
        let update = self.viz.tick(raw, now_ms);
        if let Some(frame) = update.frame {
            self.strip.push_frame(&frame);
        }
        self.append_log(update.lines);

        let t = now_ms as f64 / 1000.0;
        if let Some(ema) = self.viz.ema() {
            self.ema_history.push((t, ema as f64));
        }
        self.ema_history
            .retain(|&(ts, _)| t - ts <= CHART_WINDOW_S);
    }

    /// Feeds one protocol line through the pipeline, exactly as if it had
    /// arrived over serial.
    fn inject(&mut self, line: &str) {
        self.append_log(vec![format!("> {line}")]);
        let outcome = self.viz.handle_line(line);
        self.append_log(outcome.lines);
        if outcome.action == Some(HostAction::Recalibrate) {
            // Blocks the UI for the calibration duration, like the real
            // runtime blocks its control loop.
            let mut transcript = Vec::new();
            if self
                .viz
                .calibrate(&mut self.sensor, &mut self.strip, &mut transcript)
                .is_ok()
            {
                let lines = String::from_utf8_lossy(&transcript)
                    .lines()
                    .map(str::to_owned)
                    .collect();
                self.append_log(lines);
            }
            self.ema_history.clear();
        }
    }

    fn on_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('s') => self.inject("sim"),
            KeyCode::Char('r') => self.inject("RESET"),
            KeyCode::Char('c') => self.inject("CALIBRATE"),
            KeyCode::Char('p') => self.inject("PING"),
            KeyCode::Char('g') => {
                self.group = if self.group >= 5 { 1 } else { self.group + 1 };
                self.inject(&format!("GROUP:{}", self.group));
            }
            KeyCode::Char('m') => {
                self.mode_index = (self.mode_index + 1) % MODE_COMMANDS.len();
                self.inject(MODE_COMMANDS[self.mode_index]);
            }
            KeyCode::Char('+') => {
                let next = self.viz.engine().brightness().saturating_add(32);
                self.inject(&format!("BRIGHTNESS:{next}"));
            }
            KeyCode::Char('-') => {
                let next = self.viz.engine().brightness().saturating_sub(32);
                self.inject(&format!("BRIGHTNESS:{next}"));
            }
            _ => {}
        }
    }

    fn append_log(&mut self, lines: Vec<String>) {
        self.log.extend(lines);
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }
}

pub fn engage_gui(
    viz: GsrVisualizer,
    sensor: DummyGsr,
    strip: MemoryStrip,
    startup_lines: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(50);
    let app = App::new(viz, sensor, strip, startup_lines);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err)
    }

    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    return Ok(());
                }
                app.on_key(key.code);
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(10),
        ])
        .split(f.size());

    // One block glyph per pixel, painted with the frame's actual color.
    let pixels: Vec<Span> = app
        .strip
        .last_frame()
        .iter()
        .map(|px| Span::styled("██", Style::default().fg(Color::Rgb(px.r, px.g, px.b))))
        .collect();
    let chain = Paragraph::new(Line::from(pixels)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("LED chain  [q]uit [s]im [r]eset [c]alibrate [g]roup [m]ode [p]ing [+/-]"),
    );
    f.render_widget(chain, chunks[0]);

    let now = app.epoch.elapsed().as_millis() as f64 / 1000.0;
    let x_min = (now - CHART_WINDOW_S).max(0.0);
    let chart = Chart::new(vec![Dataset::default()
        .name("EMA")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&app.ema_history)])
    .block(Block::default().borders(Borders::ALL).title("Filtered signal"))
    .x_axis(
        Axis::default()
            .title(Span::styled("t (s)", Style::default().fg(Color::Gray)))
            .style(Style::default().fg(Color::White))
            .bounds([x_min, now.max(CHART_WINDOW_S)])
            .labels(
                [format!("{x_min:.0}"), format!("{:.0}", now.max(CHART_WINDOW_S))]
                    .into_iter()
                    .map(Span::from)
                    .collect(),
            ),
    )
    .y_axis(
        Axis::default()
            .title(Span::styled("EMA", Style::default().fg(Color::Gray)))
            .style(Style::default().fg(Color::White))
            .bounds([0.0, 1023.0])
            .labels(
                ["0", "512", "1023"]
                    .iter()
                    .cloned()
                    .map(Span::from)
                    .collect(),
            ),
    );
    f.render_widget(chart, chunks[1]);

    let status = format!(
        "group {}  brightness {}  sim {}  spike {}  affect {}  trend {:+.2}",
        app.viz.engine().group(),
        app.viz.engine().brightness(),
        if app.viz.is_simulation() { "on" } else { "off" },
        if app.viz.in_spike() { "ACTIVE" } else { "-" },
        app.viz
            .affect()
            .map_or_else(|| "-".to_owned(), |a| format!("{a:.2}")),
        app.viz.affect_trend(),
    );
    let mut lines: Vec<Line> = vec![Line::from(Span::styled(
        status,
        Style::default().fg(Color::Yellow),
    ))];
    lines.extend(
        app.log
            .iter()
            .rev()
            .take(7)
            .rev()
            .map(|l| Line::from(l.as_str())),
    );
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Lines"));
    f.render_widget(log, chunks[2]);
}
