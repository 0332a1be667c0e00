// src/io/serial/scripted.rs
//
// In-memory serial device for tests and demos.
// Reads replay a queue of steps; an empty queue behaves like a read timeout so
// the transport's read loop keeps polling. A shared probe records what the
// transport did to the device (open, close, writes).

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::device::{DeviceFilter, PortProvider, SerialDevice};
use crate::io::IoError;

/// Pause before reporting an empty queue as a timeout
const IDLE_READ_DELAY: Duration = Duration::from_millis(2);

/// One scripted read result
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptStep {
    /// Deliver these bytes
    Data(Vec<u8>),
    /// Fail the read with this error kind
    Error(ErrorKind),
    /// End of stream (`Ok(0)`)
    Eof,
    /// Block the read for this long, then fail with this error kind
    Stall(Duration, ErrorKind),
}

/// What happened to a scripted device, shared with the test
#[derive(Debug, Default)]
pub struct DeviceProbe {
    opened: AtomicBool,
    baud_rate: AtomicUsize,
    close_count: AtomicUsize,
    reads_after_close: AtomicUsize,
    written: Mutex<Vec<u8>>,
}

impl DeviceProbe {
    pub fn opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.load(Ordering::SeqCst) as u32
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// Reads attempted after `close`, always 0 for a well-behaved owner
    pub fn reads_after_close(&self) -> usize {
        self.reads_after_close.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

/// Scripted serial device. Clones share the same queue and probe, so a test can
/// keep a clone and push more data while the transport owns the original.
#[derive(Clone, Debug)]
pub struct ScriptedDevice {
    name: String,
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    open_error: Option<String>,
    probe: Arc<DeviceProbe>,
}

impl ScriptedDevice {
    pub fn new(name: impl Into<String>) -> Self {
        ScriptedDevice {
            name: name.into(),
            steps: Arc::new(Mutex::new(VecDeque::new())),
            open_error: None,
            probe: Arc::new(DeviceProbe::default()),
        }
    }

    /// Make `open` fail with the given reason
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    pub fn push(&self, step: ScriptStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    pub fn push_data(&self, data: impl AsRef<[u8]>) {
        self.push(ScriptStep::Data(data.as_ref().to_vec()));
    }

    /// Steps not yet consumed
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn probe(&self) -> Arc<DeviceProbe> {
        self.probe.clone()
    }
}

impl SerialDevice for ScriptedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, baud_rate: u32, _read_timeout: Duration) -> Result<(), IoError> {
        if let Some(reason) = &self.open_error {
            return Err(IoError::Open {
                port: self.name.clone(),
                reason: reason.clone(),
            });
        }
        self.probe.baud_rate.store(baud_rate as usize, Ordering::SeqCst);
        self.probe.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.probe.is_closed() {
            self.probe.reads_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(std::io::Error::from(ErrorKind::NotConnected));
        }

        let step = self
            .steps
            .lock()
            .map_err(|_| std::io::Error::new(ErrorKind::Other, "script lock poisoned"))?
            .pop_front();

        match step {
            Some(ScriptStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    // Larger than the read buffer, keep the rest for the next read
                    let rest = data.split_off(n);
                    if let Ok(mut steps) = self.steps.lock() {
                        steps.push_front(ScriptStep::Data(rest));
                    }
                }
                Ok(n)
            }
            Some(ScriptStep::Error(kind)) => Err(std::io::Error::new(kind, "scripted failure")),
            Some(ScriptStep::Eof) => Ok(0),
            Some(ScriptStep::Stall(delay, kind)) => {
                std::thread::sleep(delay);
                Err(std::io::Error::new(kind, "scripted failure after stall"))
            }
            None => {
                std::thread::sleep(IDLE_READ_DELAY);
                Err(std::io::Error::from(ErrorKind::TimedOut))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut written = self
            .probe
            .written
            .lock()
            .map_err(|_| std::io::Error::new(ErrorKind::Other, "probe lock poisoned"))?;
        written.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<(), IoError> {
        self.probe.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider handing out one scripted device
#[derive(Debug)]
pub struct ScriptedPortProvider {
    supported: bool,
    device: Mutex<Option<ScriptedDevice>>,
    requests: AtomicUsize,
}

impl ScriptedPortProvider {
    /// Provider that selects `device` on the first request
    pub fn with_device(device: ScriptedDevice) -> Self {
        ScriptedPortProvider {
            supported: true,
            device: Mutex::new(Some(device)),
            requests: AtomicUsize::new(0),
        }
    }

    /// Provider where the user declines to pick a device
    pub fn cancelled() -> Self {
        ScriptedPortProvider {
            supported: true,
            device: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Provider on a platform without serial access
    pub fn unsupported() -> Self {
        ScriptedPortProvider {
            supported: false,
            device: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Put a device up for the next request
    pub fn offer(&self, device: ScriptedDevice) {
        if let Ok(mut slot) = self.device.lock() {
            *slot = Some(device);
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PortProvider for ScriptedPortProvider {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn request_port(&self, _filters: &[DeviceFilter]) -> Result<Option<Box<dyn SerialDevice>>, IoError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let device = self
            .device
            .lock()
            .map_err(|_| IoError::Enumerate("provider lock poisoned".to_string()))?
            .take();
        Ok(device.map(|d| Box::new(d) as Box<dyn SerialDevice>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_steps() {
        let mut device = ScriptedDevice::new("sim0");
        device.push_data(b"abc");
        device.push(ScriptStep::Eof);
        device.push(ScriptStep::Error(ErrorKind::BrokenPipe));

        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(device.read(&mut buf).unwrap(), 0);
        assert_eq!(device.read(&mut buf).unwrap_err().kind(), ErrorKind::BrokenPipe);
        assert_eq!(device.read(&mut buf).unwrap_err().kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_stall_blocks_then_fails() {
        let mut device = ScriptedDevice::new("sim0");
        device.push(ScriptStep::Stall(Duration::from_millis(20), ErrorKind::BrokenPipe));

        let mut buf = [0u8; 4];
        let started = std::time::Instant::now();
        assert_eq!(device.read(&mut buf).unwrap_err().kind(), ErrorKind::BrokenPipe);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_large_chunk_split_over_reads() {
        let mut device = ScriptedDevice::new("sim0");
        device.push_data(b"0123456789");

        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(device.read(&mut buf).unwrap(), 4);
        assert_eq!(device.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
    }

    #[test]
    fn test_probe_tracks_lifecycle() {
        let mut device = ScriptedDevice::new("sim0");
        let probe = device.probe();
        device.open(115_200, Duration::from_millis(10)).unwrap();
        device.write(b"ping").unwrap();
        device.close().unwrap();

        let mut buf = [0u8; 4];
        assert!(device.read(&mut buf).is_err());
        assert!(probe.opened());
        assert_eq!(probe.baud_rate(), 115_200);
        assert_eq!(probe.written(), b"ping".to_vec());
        assert_eq!(probe.close_count(), 1);
        assert_eq!(probe.reads_after_close(), 1);
    }

    #[test]
    fn test_provider_hands_out_once() {
        let provider = ScriptedPortProvider::with_device(ScriptedDevice::new("sim0"));
        assert!(provider.request_port(&[]).unwrap().is_some());
        assert!(provider.request_port(&[]).unwrap().is_none());
        assert_eq!(provider.requests(), 2);
        assert!(!ScriptedPortProvider::unsupported().is_supported());
    }
}
