// src/viewer.rs
//
// Visualization consumer.
// Applies incoming lines to the displayed frame, tracks the connection state
// and produces the events the front ends render (JSON lines for the headless
// streamer, a heatmap for the terminal UI).

use serde::Serialize;
use std::future::Future;
use std::io::Write;
use tokio::sync::mpsc;

use crate::frame::{Frame, FrameBounds, FrameState, SensorGeometry};
use crate::io::{ConnectOutcome, ConnectionState, SourceMessage, ThermalSource};
use crate::palette;

// ============================================================================
// Events
// ============================================================================

/// Event emitted to the front end
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerEvent {
    Frame {
        width: usize,
        height: usize,
        min: f32,
        max: f32,
        /// Row-major, smoothed when smoothing is on
        pixels: Vec<f32>,
    },
    State {
        state: ConnectionState,
    },
    Error {
        message: String,
    },
}

// ============================================================================
// Viewer
// ============================================================================

/// Display-side state: the current frame, smoothing toggle and connection.
#[derive(Clone, Debug)]
pub struct Viewer {
    frames: FrameState,
    smoothing: bool,
    connection: ConnectionState,
    last_error: Option<String>,
}

impl Viewer {
    pub fn new(geometry: SensorGeometry, smoothing: bool) -> Self {
        Viewer {
            frames: FrameState::new(geometry),
            smoothing,
            connection: ConnectionState::Disconnected,
            last_error: None,
        }
    }

    pub fn smoothing(&self) -> bool {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, enabled: bool) {
        self.smoothing = enabled;
    }

    pub fn toggle_smoothing(&mut self) -> bool {
        self.smoothing = !self.smoothing;
        self.smoothing
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bounds of the displayed frame ({0, 0} when nothing is shown)
    pub fn bounds(&self) -> FrameBounds {
        self.frames.bounds()
    }

    /// Frame as it should be drawn
    pub fn display_frame(&self) -> Option<Frame> {
        let frame = self.frames.frame()?;
        if self.smoothing {
            Some(palette::smooth(frame))
        } else {
            Some(frame.clone())
        }
    }

    pub fn frame_state(&self) -> &FrameState {
        &self.frames
    }

    /// Apply a message from the source. Returns the event to emit, if any.
    pub fn handle_message(&mut self, message: SourceMessage) -> Option<ViewerEvent> {
        match message {
            SourceMessage::Data(line) => {
                if self.frames.apply_line(&line) {
                    self.frame_event()
                } else {
                    None
                }
            }
            SourceMessage::Error(message) => {
                self.last_error = Some(message.clone());
                Some(ViewerEvent::Error { message })
            }
        }
    }

    /// Record a connection change. Losing the source clears the display.
    pub fn handle_state(&mut self, state: ConnectionState) -> ViewerEvent {
        self.connection = state;
        match state {
            ConnectionState::Disconnected => self.frames.reset(),
            ConnectionState::Connecting => self.last_error = None,
            ConnectionState::Connected => {}
        }
        ViewerEvent::State { state }
    }

    /// Event describing the displayed frame
    pub fn frame_event(&self) -> Option<ViewerEvent> {
        let frame = self.display_frame()?;
        let bounds = self.bounds();
        Some(ViewerEvent::Frame {
            width: frame.width(),
            height: frame.height(),
            min: bounds.min,
            max: bounds.max,
            pixels: frame.into_pixels(),
        })
    }
}

// ============================================================================
// Event Stream
// ============================================================================

fn emit<W: Write>(out: &mut W, event: &ViewerEvent) -> Result<(), String> {
    let json = serde_json::to_string(event).map_err(|e| format!("Failed to serialize event: {}", e))?;
    writeln!(out, "{}", json).map_err(|e| format!("Failed to write event: {}", e))?;
    out.flush().map_err(|e| format!("Failed to flush output: {}", e))
}

/// Run a source until `shutdown` resolves or the source ends by itself,
/// writing one JSON event per line to `out`.
pub async fn stream_events<W, F>(
    source: &mut dyn ThermalSource,
    rx: &mut mpsc::UnboundedReceiver<SourceMessage>,
    viewer: &mut Viewer,
    out: &mut W,
    shutdown: F,
) -> Result<(), String>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut state_rx = source.subscribe();
    tokio::pin!(shutdown);

    match source.start().await {
        Ok(ConnectOutcome::Connected) => {
            emit(out, &viewer.handle_state(ConnectionState::Connected))?;
        }
        Ok(ConnectOutcome::Cancelled) => {
            tlog!("[viewer:{}] Source did not start", source.device_type());
            emit(out, &viewer.handle_state(ConnectionState::Disconnected))?;
            return Ok(());
        }
        Err(e) => {
            // The source already reported why through the sink
            while let Ok(message) = rx.try_recv() {
                if let Some(event) = viewer.handle_message(message) {
                    emit(out, &event)?;
                }
            }
            emit(out, &viewer.handle_state(ConnectionState::Disconnected))?;
            return Err(e.to_string());
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tlog!("[viewer] Shutdown requested");
                break;
            }
            Some(message) = rx.recv() => {
                if let Some(event) = viewer.handle_message(message) {
                    emit(out, &event)?;
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // Everything the source sent before changing state comes first
                while let Ok(message) = rx.try_recv() {
                    if let Some(event) = viewer.handle_message(message) {
                        emit(out, &event)?;
                    }
                }
                let state = *state_rx.borrow_and_update();
                if state == viewer.connection() {
                    continue;
                }
                emit(out, &viewer.handle_state(state))?;
                if state == ConnectionState::Disconnected {
                    tlog!("[viewer:{}] Source ended", source.device_type());
                    break;
                }
            }
        }
    }

    if let Err(e) = source.stop().await {
        tlog!("[viewer] Failed to stop source: {}", e);
    }

    // Anything reported during teardown (frames are dropped)
    while let Ok(message) = rx.try_recv() {
        if let SourceMessage::Error(_) = message {
            if let Some(event) = viewer.handle_message(message) {
                emit(out, &event)?;
            }
        }
    }

    if viewer.connection() != ConnectionState::Disconnected {
        emit(out, &viewer.handle_state(ConnectionState::Disconnected))?;
    }
    Ok(())
}
