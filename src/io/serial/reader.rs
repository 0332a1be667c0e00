// src/io/serial/reader.rs
//
// Serial transport for thermal cameras.
// Selects and opens a device, runs the blocking read → decode → frame loop on
// a dedicated thread, and tears everything down on disconnect, device loss or
// read failure.

use async_trait::async_trait;
use std::sync::mpsc as std_mpsc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::decoder::Utf8StreamDecoder;
use super::device::{default_device_filters, DeviceFilter, PortProvider, SerialDevice};
use super::framer::LineFramer;
use crate::frame::MAX_LINE_CHARS;
use crate::io::{ConnectOutcome, ConnectionState, DataSink, IoError, ThermalSource};

// ============================================================================
// Types and Configuration
// ============================================================================

/// Bit rate used by the camera firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Upper bound on one blocking read; also the worst-case delay before a
/// disconnect is noticed by the read loop
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Line buffer cap before an unterminated line is discarded
pub const DEFAULT_MAX_LINE_BUFFER: usize = MAX_LINE_CHARS * 16;

/// How long `transmit` waits for the read loop to perform a write
const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial transport configuration
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Narrows device selection, never rejects a device
    pub filters: Vec<DeviceFilter>,
    /// Characters allowed to accumulate without a newline
    pub max_line_buffer: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            filters: default_device_filters(),
            max_line_buffer: DEFAULT_MAX_LINE_BUFFER,
        }
    }
}

/// Write request handed to the read loop, which owns the device
struct TransmitRequest {
    data: Vec<u8>,
    result_tx: oneshot::Sender<Result<(), String>>,
}

// ============================================================================
// Serial Transport
// ============================================================================

/// Serial data source with an explicit connect/disconnect lifecycle.
pub struct SerialTransport {
    provider: Arc<dyn PortProvider>,
    sink: Arc<dyn DataSink>,
    config: SerialConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
    transmit_tx: Option<std_mpsc::SyncSender<TransmitRequest>>,
    port_name: Option<String>,
}

impl SerialTransport {
    pub fn new(provider: Arc<dyn PortProvider>, sink: Arc<dyn DataSink>, config: SerialConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            provider,
            sink,
            config,
            state: Arc::new(state),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
            transmit_tx: None,
            port_name: None,
        }
    }

    /// Whether the platform exposes serial access, independent of any device
    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Name of the port of the current or last connection
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Select a device, open it and start streaming.
    ///
    /// Failures are reported through `on_error` and returned. A declined
    /// selection is `Ok(ConnectOutcome::Cancelled)` and reports nothing.
    pub async fn connect(&mut self) -> Result<ConnectOutcome, IoError> {
        if !self.provider.is_supported() {
            let err = IoError::Unsupported;
            self.sink.on_error(&err.to_string());
            return Err(err);
        }

        if self.state() != ConnectionState::Disconnected {
            return Err(IoError::AlreadyConnected);
        }

        // A previous read loop may have ended on its own (device loss); reap it
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[serial] Read task panicked: {:?}", e);
            }
        }
        self.transmit_tx = None;

        self.state.send_replace(ConnectionState::Connecting);

        let mut device = match self.provider.request_port(&self.config.filters) {
            Ok(Some(device)) => device,
            Ok(None) => {
                tlog!("[serial] No device selected");
                self.state.send_replace(ConnectionState::Disconnected);
                return Ok(ConnectOutcome::Cancelled);
            }
            Err(e) => {
                self.sink.on_error(&format!("Failed to connect: {}", e));
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let port = device.name().to_string();
        if let Err(e) = device.open(self.config.baud_rate, self.config.read_timeout) {
            tlog!("[serial:{}] Open failed: {}", port, e);
            self.sink.on_error(&format!("Failed to connect: {}", e));
            let _ = device.close();
            self.state.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }

        tlog!(
            "[serial:{}] Opened at {} baud (8-N-1, read timeout {:?})",
            port,
            self.config.baud_rate,
            self.config.read_timeout
        );

        // Fresh flag per connection so a stale loop can never be revived
        self.cancel_flag = Arc::new(AtomicBool::new(false));
        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel::<TransmitRequest>(32);
        self.transmit_tx = Some(transmit_tx);
        self.port_name = Some(port);

        self.state.send_replace(ConnectionState::Connected);

        let ctx = ReadLoopContext {
            sink: self.sink.clone(),
            state: self.state.clone(),
            cancel_flag: self.cancel_flag.clone(),
            max_line_buffer: self.config.max_line_buffer,
            transmit_rx,
        };
        self.task_handle = Some(tokio::task::spawn_blocking(move || run_read_loop(device, ctx)));

        Ok(ConnectOutcome::Connected)
    }

    /// Stop streaming and release the device.
    ///
    /// Never fails and always ends Disconnected. Once this returns, the sink
    /// receives nothing further from this connection.
    pub async fn disconnect(&mut self) {
        // Flag first: the loop checks it before every read and every delivery
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.transmit_tx = None;

        // The pending read returns within `read_timeout`; the loop then lets go
        // of the device and closes it before finishing
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[serial] Read task panicked: {:?}", e);
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Write raw bytes to the device (commands to the camera firmware).
    pub async fn transmit(&self, data: &[u8]) -> Result<(), IoError> {
        if data.is_empty() {
            return Ok(());
        }

        let tx = match (&self.transmit_tx, self.state()) {
            (Some(tx), ConnectionState::Connected) => tx.clone(),
            _ => return Err(IoError::NotConnected),
        };

        let (result_tx, result_rx) = oneshot::channel();
        tx.try_send(TransmitRequest {
            data: data.to_vec(),
            result_tx,
        })
        .map_err(|e| IoError::Transmit(format!("Failed to queue transmit request: {}", e)))?;

        match tokio::time::timeout(TRANSMIT_TIMEOUT, result_rx).await {
            Ok(Ok(result)) => result.map_err(IoError::Transmit),
            Ok(Err(_)) => Err(IoError::NotConnected),
            Err(_) => Err(IoError::Transmit("Transmit timeout".to_string())),
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        // Can't await here; the loop sees the flag and closes the device itself
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ThermalSource for SerialTransport {
    async fn start(&mut self) -> Result<ConnectOutcome, IoError> {
        self.connect().await
    }

    async fn stop(&mut self) -> Result<(), IoError> {
        self.disconnect().await;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        SerialTransport::state(self)
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        SerialTransport::subscribe(self)
    }

    fn device_type(&self) -> &'static str {
        "serial"
    }
}

// ============================================================================
// Read Loop
// ============================================================================

struct ReadLoopContext {
    sink: Arc<dyn DataSink>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel_flag: Arc<AtomicBool>,
    max_line_buffer: usize,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
}

/// Blocking read loop. Owns the device for its whole life: nothing else can
/// read from it, and it is closed here once reading has stopped.
fn run_read_loop(mut device: Box<dyn SerialDevice>, ctx: ReadLoopContext) {
    let port = device.name().to_string();
    let mut decoder = Utf8StreamDecoder::new();
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];
    let mut failure: Option<IoError> = None;
    let mut lines_delivered: u64 = 0;

    tlog!("[serial:{}] Starting stream", port);

    let reason = 'read: loop {
        if ctx.cancel_flag.load(Ordering::SeqCst) {
            break "stopped";
        }

        // Process pending transmit requests (non-blocking)
        while let Ok(req) = ctx.transmit_rx.try_recv() {
            let result = device
                .write(&req.data)
                .map_err(|e| format!("Serial write error: {}", e));
            let _ = req.result_tx.send(result);
        }

        match device.read(&mut buf) {
            Ok(0) => break "end of stream",
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                for line in framer.feed(&text) {
                    if ctx.cancel_flag.load(Ordering::SeqCst) {
                        break 'read "stopped";
                    }
                    ctx.sink.on_data(&line);
                    lines_delivered += 1;
                }

                if framer.pending_len() > ctx.max_line_buffer {
                    tlog!(
                        "[serial:{}] Discarding {} chars with no line terminator",
                        port,
                        framer.pending_len()
                    );
                    framer.discard_partial();
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                // No data within the read timeout
            }
            Err(e) => {
                failure = Some(IoError::from_read_error(e));
                break "error";
            }
        }
    };

    // Reading is over. A deliberate disconnect swallows whatever the last read
    // reported.
    if let Some(err) = failure {
        if ctx.cancel_flag.load(Ordering::SeqCst) {
            tlog!("[serial:{}] Ignoring error after disconnect: {}", port, err);
        } else {
            tlog!("[serial:{}] {}", port, err);
            ctx.sink.on_error(&err.to_string());
        }
    }

    if let Some(partial) = framer.flush() {
        tlog!("[serial:{}] Dropped partial line ({} chars)", port, partial.len());
    }
    let _ = decoder.finish();

    if let Err(e) = device.close() {
        tlog!("[serial:{}] Ignoring close error: {}", port, e);
    }
    drop(device);

    ctx.state.send_replace(ConnectionState::Disconnected);
    tlog!(
        "[serial:{}] Stream ended ({}, {} lines)",
        port,
        reason,
        lines_delivered
    );
}
