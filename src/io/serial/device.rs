// src/io/serial/device.rs
//
// Device handles and port selection.
// `SerialDevice` is the exclusively-owned open channel; `PortProvider` answers
// "is serial available here?" and "which device should we use?". The system
// implementations sit on the serialport crate; tests use the scripted ones.

use serde::{Deserialize, Serialize};
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
use std::io::{Read, Write};
use std::time::Duration;

use crate::io::IoError;

// ============================================================================
// Traits
// ============================================================================

/// An open (or openable) serial channel.
///
/// `read` follows `std::io::Read` conventions with a read timeout:
/// `Ok(0)` is end of stream, `ErrorKind::TimedOut` means no data yet.
pub trait SerialDevice: Send {
    /// Port name for logs and messages
    fn name(&self) -> &str;

    fn open(&mut self, baud_rate: u32, read_timeout: Duration) -> Result<(), IoError>;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self) -> Result<(), IoError>;
}

/// Device discovery for one platform.
pub trait PortProvider: Send + Sync {
    /// Whether the platform exposes serial access at all
    fn is_supported(&self) -> bool;

    /// Pick a device. `Ok(None)` means nothing was selected, which is not an
    /// error.
    fn request_port(&self, filters: &[DeviceFilter]) -> Result<Option<Box<dyn SerialDevice>>, IoError>;
}

// ============================================================================
// Device Filters
// ============================================================================

/// USB vendor/product pair used to narrow port selection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    /// `None` matches any product from the vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    pub fn vendor(vendor_id: u16) -> Self {
        DeviceFilter {
            vendor_id,
            product_id: None,
        }
    }

    pub fn product(vendor_id: u16, product_id: u16) -> Self {
        DeviceFilter {
            vendor_id,
            product_id: Some(product_id),
        }
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vendor_id == vid && self.product_id.map_or(true, |p| p == pid)
    }
}

/// USB-serial bridges commonly found on thermal camera boards
pub fn default_device_filters() -> Vec<DeviceFilter> {
    vec![
        DeviceFilter::vendor(0x2341),           // Arduino
        DeviceFilter::vendor(0x1B4F),           // SparkFun
        DeviceFilter::vendor(0x239A),           // Adafruit
        DeviceFilter::vendor(0x303A),           // Espressif native USB
        DeviceFilter::product(0x10C4, 0xEA60),  // CP210x
        DeviceFilter::product(0x1A86, 0x7523),  // CH340
        DeviceFilter::vendor(0x0403),           // FTDI
        DeviceFilter::vendor(0x16C0),           // Teensy
    ]
}

// ============================================================================
// Port Listing
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    /// Whether the port matches the device filter list
    pub matches_filter: bool,
}

impl SerialPortInfo {
    fn matches_any(&self, filters: &[DeviceFilter]) -> bool {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => filters.iter().any(|f| f.matches(vid, pid)),
            _ => false,
        }
    }
}

/// Choose a port: the first port matching the earliest filter, otherwise the
/// first port listed. Filters only narrow the choice.
pub fn select_port<'a>(ports: &'a [SerialPortInfo], filters: &[DeviceFilter]) -> Option<&'a SerialPortInfo> {
    filters
        .iter()
        .find_map(|filter| ports.iter().find(|p| p.matches_any(std::slice::from_ref(filter))))
        .or_else(|| ports.first())
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub fn list_serial_ports(filters: &[DeviceFilter]) -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports().map_err(|e| IoError::Enumerate(e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            let mut info = SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
                matches_filter: false,
            };
            info.matches_filter = info.matches_any(filters);
            info
        })
        .collect())
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
pub fn list_serial_ports(_filters: &[DeviceFilter]) -> Result<Vec<SerialPortInfo>, IoError> {
    Err(IoError::Unsupported)
}

// ============================================================================
// System Device
// ============================================================================

/// Serial port backed by the serialport crate
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub struct SystemSerialDevice {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
impl SystemSerialDevice {
    pub fn new(port_name: impl Into<String>) -> Self {
        SystemSerialDevice {
            port_name: port_name.into(),
            port: None,
        }
    }
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
impl SerialDevice for SystemSerialDevice {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn open(&mut self, baud_rate: u32, read_timeout: Duration) -> Result<(), IoError> {
        let port = serialport::new(&self.port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| IoError::Open {
                port: self.port_name.clone(),
                reason: e.to_string(),
            })?;
        self.port = Some(port);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.port.as_mut() {
            Some(port) => port.read(buf),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port is not open",
            )),
        }
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.port.as_mut() {
            Some(port) => {
                port.write_all(data)?;
                port.flush()
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port is not open",
            )),
        }
    }

    fn close(&mut self) -> Result<(), IoError> {
        // serialport releases the OS handle on drop
        self.port.take();
        Ok(())
    }
}

// ============================================================================
// System Provider
// ============================================================================

/// Port selection against the host's serial ports.
/// A configured port name is used as-is; otherwise ports are enumerated and
/// narrowed by the device filters.
#[derive(Clone, Debug, Default)]
pub struct SystemPortProvider {
    port_name: Option<String>,
}

impl SystemPortProvider {
    pub fn new(port_name: Option<String>) -> Self {
        SystemPortProvider { port_name }
    }
}

impl PortProvider for SystemPortProvider {
    fn is_supported(&self) -> bool {
        cfg!(any(target_os = "windows", target_os = "macos", target_os = "linux"))
    }

    #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
    fn request_port(&self, filters: &[DeviceFilter]) -> Result<Option<Box<dyn SerialDevice>>, IoError> {
        if let Some(name) = &self.port_name {
            return Ok(Some(Box::new(SystemSerialDevice::new(name.clone()))));
        }

        let ports = list_serial_ports(filters)?;
        Ok(select_port(&ports, filters)
            .map(|p| Box::new(SystemSerialDevice::new(p.port_name.clone())) as Box<dyn SerialDevice>))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    fn request_port(&self, _filters: &[DeviceFilter]) -> Result<Option<Box<dyn SerialDevice>>, IoError> {
        Err(IoError::Unsupported)
    }
}
