// src/io/serial/mod.rs
//
// Serial camera driver.
// Raw bytes from the port are decoded as UTF-8, framed on newlines and
// delivered line by line to the data sink.

mod decoder;
mod device;
pub mod framer;
mod reader;
mod scripted;

pub use decoder::Utf8StreamDecoder;
#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
pub use device::SystemSerialDevice;
pub use device::{
    default_device_filters, list_serial_ports, select_port, DeviceFilter, PortProvider, SerialDevice,
    SerialPortInfo, SystemPortProvider,
};
pub use framer::LineFramer;
pub use reader::{
    SerialConfig, SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_MAX_LINE_BUFFER,
    DEFAULT_READ_TIMEOUT,
};
pub use scripted::{DeviceProbe, ScriptStep, ScriptedDevice, ScriptedPortProvider};
