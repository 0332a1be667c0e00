// src/lib.rs
//
// Thermal camera viewer: ingest CSV frames from a serial camera (or the
// built-in simulator), parse them into temperature grids and hand them to a
// front end.

// Logging must be declared first so `tlog!` is visible to every module
#[macro_use]
pub mod logging;

pub mod frame;
pub mod io;
pub mod palette;
pub mod settings;
pub mod viewer;

use std::path::PathBuf;
use std::sync::Arc;

use io::serial::{SerialTransport, SystemPortProvider};
use io::{ChannelSink, DataSink, SimulatorSource, ThermalSource};
use settings::{AppSettings, SourceKind};
use viewer::Viewer;

/// Create the data source selected in the settings.
pub fn build_source(settings: &AppSettings, sink: Arc<dyn DataSink>) -> Box<dyn ThermalSource> {
    match settings.source {
        SourceKind::Simulator => Box::new(SimulatorSource::new(settings.simulator_config(), sink)),
        SourceKind::Serial => Box::new(SerialTransport::new(
            Arc::new(SystemPortProvider::new(settings.port_name.clone())),
            sink,
            settings.serial_config(),
        )),
    }
}

/// Start file logging if enabled. Failures are logged and otherwise ignored.
pub fn setup_logging(settings: &AppSettings) {
    if !settings.file_logging {
        return;
    }

    let log_dir = PathBuf::from(&settings.log_dir);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        tlog!("[setup] Failed to create log directory {:?}: {}", log_dir, e);
        return;
    }
    let validation = settings::validate_directory(&log_dir);
    if let Some(err) = validation.error {
        tlog!("[setup] Log directory {:?} unusable: {}", log_dir, err);
        return;
    }
    if let Err(e) = logging::init_file_logging(&log_dir) {
        tlog!("[setup] {}", e);
    }
}

/// Headless streamer: run the configured source and print one JSON event per
/// line on stdout until Ctrl-C or until the source goes away.
pub fn run() {
    let settings = match settings::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tlog!("[setup] Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    };
    setup_logging(&settings);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tlog!("[setup] Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let (sink, mut rx) = ChannelSink::channel();
        let mut source = build_source(&settings, Arc::new(sink));
        let mut viewer = Viewer::new(frame::SensorGeometry::default(), settings.smoothing);
        let mut stdout = std::io::stdout();

        tlog!("[setup] Streaming from {} source", source.device_type());

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tlog!("[setup] Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        viewer::stream_events(source.as_mut(), &mut rx, &mut viewer, &mut stdout, shutdown).await
    });

    logging::stop_file_logging();

    if let Err(e) = result {
        tlog!("[setup] {}", e);
        std::process::exit(1);
    }
}
