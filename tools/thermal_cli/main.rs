// tools/thermal_cli/main.rs
//
// Terminal heatmap for serial thermal cameras.
// Draws each frame with half-block characters (two sensor rows per terminal
// row), plus the legend, min/max readout and connection badge.
//
// Keys: c connect/disconnect, s toggle smoothing, q quit.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures::StreamExt;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::DefaultTerminal;
use tokio::sync::{mpsc, watch};

use thermalview_lib::frame::SensorGeometry;
use thermalview_lib::io::serial::{list_serial_ports, SerialPortInfo};
use thermalview_lib::io::{ChannelSink, ConnectOutcome, ConnectionState, SourceMessage, ThermalSource};
use thermalview_lib::palette::{self, Rgb, LEGEND_STOPS};
use thermalview_lib::settings::{self, AppSettings, SourceKind};
use thermalview_lib::viewer::Viewer;
use thermalview_lib::{build_source, logging, setup_logging, tlog};

#[derive(Parser, Debug)]
#[command(name = "thermal_cli", about = "Live heatmap for serial thermal cameras")]
struct Args {
    /// Use the built-in simulator instead of a camera
    #[arg(long, conflicts_with = "port")]
    simulate: bool,

    /// Serial port to open (skips automatic selection)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Simulator frames per second
    #[arg(long)]
    frame_rate: Option<u32>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Draw raw pixels without smoothing
    #[arg(long)]
    no_smoothing: bool,
}

impl Args {
    fn apply(&self, settings: &mut AppSettings) {
        if self.simulate {
            settings.source = SourceKind::Simulator;
        }
        if let Some(port) = &self.port {
            settings.source = SourceKind::Serial;
            settings.port_name = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(rate) = self.frame_rate {
            settings.frame_rate = rate;
        }
        if self.no_smoothing {
            settings.smoothing = false;
        }
    }
}

// ============================================================================
// App
// ============================================================================

struct App {
    source: Box<dyn ThermalSource>,
    rx: mpsc::UnboundedReceiver<SourceMessage>,
    state_rx: watch::Receiver<ConnectionState>,
    viewer: Viewer,
    status: Option<String>,
}

impl App {
    fn new(settings: &AppSettings) -> Self {
        let (sink, rx) = ChannelSink::channel();
        let source = build_source(settings, Arc::new(sink));
        let state_rx = source.subscribe();
        App {
            source,
            rx,
            state_rx,
            viewer: Viewer::new(SensorGeometry::default(), settings.smoothing),
            status: None,
        }
    }

    async fn toggle_connection(&mut self) {
        if self.source.state() == ConnectionState::Disconnected {
            self.status = None;
            // Failures also arrive as error messages through the sink
            match self.source.start().await {
                Ok(ConnectOutcome::Connected) => {}
                Ok(ConnectOutcome::Cancelled) => self.status = Some("No device selected".to_string()),
                Err(e) => tlog!("[cli] Start failed: {}", e),
            }
        } else if let Err(e) = self.source.stop().await {
            tlog!("[cli] Stop failed: {}", e);
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('s') => {
                let on = self.viewer.toggle_smoothing();
                self.status = Some(format!("Smoothing {}", if on { "on" } else { "off" }));
            }
            _ => {}
        }
        true
    }
}

async fn run_app(terminal: &mut DefaultTerminal, app: &mut App) -> std::io::Result<()> {
    let mut events = EventStream::new();
    app.toggle_connection().await;

    loop {
        terminal.draw(|f| draw(f, app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if key.code == KeyCode::Char('c') {
                        app.toggle_connection().await;
                    } else if !app.handle_key(key.code) {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            },
            Some(message) = app.rx.recv() => {
                app.viewer.handle_message(message);
            }
            Ok(()) = app.state_rx.changed() => {
                let state = *app.state_rx.borrow_and_update();
                app.viewer.handle_state(state);
            }
        }
    }

    if let Err(e) = app.source.stop().await {
        tlog!("[cli] Stop failed: {}", e);
    }
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn rgb(c: Rgb) -> Color {
    Color::Rgb(c.0, c.1, c.2)
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let [header, body, legend, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(f.area());

    f.render_widget(header_line(app), header);
    draw_heatmap(f, app, body);
    f.render_widget(legend_widget(app), legend);

    let help = app
        .status
        .clone()
        .or_else(|| app.viewer.last_error().map(|e| e.to_string()))
        .unwrap_or_else(|| "c connect/disconnect   s smoothing   q quit".to_string());
    f.render_widget(Paragraph::new(help).style(Style::default().fg(Color::DarkGray)), footer);
}

fn header_line(app: &App) -> Paragraph<'static> {
    let (badge, color) = match app.viewer.connection() {
        ConnectionState::Connected => (" LIVE ", Color::Green),
        ConnectionState::Connecting => (" CONNECTING ", Color::Yellow),
        ConnectionState::Disconnected => (" OFFLINE ", Color::Red),
    };
    let bounds = app.viewer.bounds();
    let readout = if app.viewer.display_frame().is_some() {
        format!("  min {:.1}°C  max {:.1}°C", bounds.min, bounds.max)
    } else {
        "  min --  max --".to_string()
    };
    Paragraph::new(Line::from(vec![
        Span::styled(badge, Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {}", app.source.device_type())),
        Span::raw(readout),
        Span::styled(
            if app.viewer.smoothing() { "  [smooth]" } else { "" },
            Style::default().fg(Color::Cyan),
        ),
    ]))
}

fn draw_heatmap(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::bordered().title(" Thermal ");
    let Some(frame) = app.viewer.display_frame() else {
        let text = match app.viewer.connection() {
            ConnectionState::Connected => "Waiting for frames...",
            _ => "Not connected. Press c to connect.",
        };
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    };

    let bounds = app.viewer.bounds();
    let width = frame.width();
    let mut lines = Vec::with_capacity(frame.height().div_ceil(2));
    for y in (0..frame.height()).step_by(2) {
        let spans: Vec<Span> = (0..width)
            .map(|x| {
                let top = frame.get(x, y).unwrap_or(bounds.min);
                let mut style = Style::default().fg(rgb(palette::temperature_color(top, &bounds)));
                if let Some(bottom) = frame.get(x, y + 1) {
                    style = style.bg(rgb(palette::temperature_color(bottom, &bounds)));
                }
                Span::styled("▀▀", style)
            })
            .collect();
        lines.push(Line::from(spans));
    }
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn legend_widget(app: &App) -> Paragraph<'static> {
    let block = Block::bordered().title(" Legend ");
    let stops = palette::legend(&app.viewer.bounds(), LEGEND_STOPS);
    if app.viewer.display_frame().is_none() || stops.is_empty() {
        return Paragraph::new(Span::styled(
            "░░░░░░  ░░░░░░  ░░░░░░  ░░░░░░  ░░░░░░  ░░░░░░",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
    }

    let spans: Vec<Span> = stops
        .iter()
        .flat_map(|stop| {
            [
                Span::styled("██", Style::default().fg(rgb(stop.color))),
                Span::raw(format!(" {:.1}°  ", stop.temperature)),
            ]
        })
        .collect();
    Paragraph::new(Line::from(spans)).block(block)
}

// ============================================================================
// Entry
// ============================================================================

fn print_ports(ports: &[SerialPortInfo]) {
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    for p in ports {
        let ids = match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "-".to_string(),
        };
        println!(
            "{} {:<24} {:<10} {:<10} {}",
            if p.matches_filter { "*" } else { " " },
            p.port_name,
            p.port_type,
            ids,
            p.product.as_deref().or(p.manufacturer.as_deref()).unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut settings = match settings::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tlog!("[cli] Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    };
    args.apply(&mut settings);

    if args.list_ports {
        return match list_serial_ports(&settings.device_filters) {
            Ok(ports) => {
                print_ports(&ports);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    setup_logging(&settings);

    let mut app = App::new(&settings);
    let mut terminal = ratatui::init();
    logging::set_stderr_enabled(false);

    let result = run_app(&mut terminal, &mut app).await;

    ratatui::restore();
    logging::set_stderr_enabled(true);
    logging::stop_file_logging();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Terminal error: {}", e);
            ExitCode::FAILURE
        }
    }
}
