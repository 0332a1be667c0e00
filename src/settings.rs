// src/settings.rs
//
// Persistent viewer settings, stored as pretty JSON in the user's config
// directory. Missing fields fall back to their defaults so older files keep
// loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::SensorGeometry;
use crate::io::serial::{default_device_filters, DeviceFilter, SerialConfig, DEFAULT_MAX_LINE_BUFFER};
use crate::io::SimulatorConfig;

/// Which data source to start with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Simulator,
    Serial,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_source")]
    pub source: SourceKind,
    /// Fixed serial port; `None` picks the first port matching the filters
    #[serde(default)]
    pub port_name: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32, // simulator only
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_line_buffer")]
    pub max_line_buffer: usize,
    #[serde(default = "default_device_filters")]
    pub device_filters: Vec<DeviceFilter>,
    #[serde(default = "default_smoothing")]
    pub smoothing: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub file_logging: bool,
    #[serde(default)]
    pub simulator_seed: Option<u64>,
}

fn default_source() -> SourceKind {
    SourceKind::Simulator
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_frame_rate() -> u32 {
    15
}
fn default_read_timeout_ms() -> u64 {
    50
}
fn default_max_line_buffer() -> usize {
    DEFAULT_MAX_LINE_BUFFER
}
fn default_smoothing() -> bool {
    true
}
fn default_log_dir() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermalview")
        .join("logs")
        .to_string_lossy()
        .to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
            port_name: None,
            baud_rate: default_baud_rate(),
            frame_rate: default_frame_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            max_line_buffer: default_max_line_buffer(),
            device_filters: default_device_filters(),
            smoothing: default_smoothing(),
            log_dir: default_log_dir(),
            file_logging: false,
            simulator_seed: None,
        }
    }
}

impl AppSettings {
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
            filters: self.device_filters.clone(),
            max_line_buffer: self.max_line_buffer,
        }
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            geometry: SensorGeometry::default(),
            frame_rate: self.frame_rate,
            seed: self.simulator_seed,
        }
    }
}

fn get_settings_path() -> Result<PathBuf, String> {
    let app_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to get config dir".to_string())?
        .join("thermalview");

    std::fs::create_dir_all(&app_dir)
        .map_err(|e| format!("Failed to create config dir: {}", e))?;

    Ok(app_dir.join("settings.json"))
}

/// Load settings from the config directory, writing defaults on first run.
pub fn load_settings() -> Result<AppSettings, String> {
    load_settings_from(&get_settings_path()?)
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    save_settings_to(&get_settings_path()?, settings)
}

pub fn load_settings_from(settings_path: &Path) -> Result<AppSettings, String> {
    if settings_path.exists() {
        let content = std::fs::read_to_string(settings_path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
    } else {
        // First run: persist the defaults so they can be edited
        let settings = AppSettings::default();
        save_settings_to(settings_path, &settings)?;
        Ok(settings)
    }
}

pub fn save_settings_to(settings_path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = settings_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(settings_path, content).map_err(|e| format!("Failed to write settings: {}", e))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectoryValidation {
    pub exists: bool,
    pub writable: bool,
    pub error: Option<String>,
}

/// Check that a directory exists and accepts new files (used for the log dir)
pub fn validate_directory(dir_path: &Path) -> DirectoryValidation {
    let exists = dir_path.is_dir();

    let writable = if exists {
        let test_file = dir_path.join(".thermalview_write_test");
        match std::fs::write(&test_file, b"test") {
            Ok(_) => {
                std::fs::remove_file(&test_file).ok();
                true
            }
            Err(_) => false,
        }
    } else {
        false
    };

    let error = if !exists {
        Some("Directory does not exist".to_string())
    } else if !writable {
        Some("Directory is not writable".to_string())
    } else {
        None
    };

    DirectoryValidation {
        exists,
        writable,
        error,
    }
}
