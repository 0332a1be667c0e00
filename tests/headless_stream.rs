// tests/headless_stream.rs
//
// End-to-end: source → channel sink → viewer → JSON event lines.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thermalview_lib::frame::{SensorGeometry, PIXEL_COUNT};
use thermalview_lib::io::serial::{
    ScriptStep, ScriptedDevice, ScriptedPortProvider, SerialConfig, SerialTransport,
};
use thermalview_lib::io::{ChannelSink, SimulatorConfig, SimulatorSource};
use thermalview_lib::viewer::{stream_events, Viewer};

fn parse_events(out: &[u8]) -> Vec<Value> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_serial_stream_until_device_gone() {
    let device = ScriptedDevice::new("ttyTEST0");
    let line = vec!["18.25"; PIXEL_COUNT].join(",");
    device.push_data(format!("{}\r\n", line));
    device.push_data(b"garbage\r\n");
    device.push(ScriptStep::Error(std::io::ErrorKind::BrokenPipe));

    let (sink, mut rx) = ChannelSink::channel();
    let mut source = SerialTransport::new(
        Arc::new(ScriptedPortProvider::with_device(device)),
        Arc::new(sink),
        SerialConfig {
            read_timeout: Duration::from_millis(5),
            ..SerialConfig::default()
        },
    );
    let mut viewer = Viewer::new(SensorGeometry::default(), false);
    let mut out = Vec::new();

    stream_events(
        &mut source,
        &mut rx,
        &mut viewer,
        &mut out,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    let events = parse_events(&out);
    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["state", "frame", "error", "state"]);
    assert_eq!(events[0]["state"], "connected");
    assert_eq!(events[1]["min"], 18.25);
    assert_eq!(events[1]["pixels"].as_array().unwrap().len(), PIXEL_COUNT);
    assert_eq!(events[2]["message"], "Device disconnected.");
    assert_eq!(events[3]["state"], "disconnected");

    // Display cleared once the source is gone
    assert!(viewer.display_frame().is_none());
}

#[tokio::test]
async fn test_serial_no_device_selected() {
    let (sink, mut rx) = ChannelSink::channel();
    let mut source = SerialTransport::new(
        Arc::new(ScriptedPortProvider::cancelled()),
        Arc::new(sink),
        SerialConfig::default(),
    );
    let mut viewer = Viewer::new(SensorGeometry::default(), true);
    let mut out = Vec::new();

    stream_events(&mut source, &mut rx, &mut viewer, &mut out, std::future::pending::<()>())
        .await
        .unwrap();

    let events = parse_events(&out);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["state"], "disconnected");
}

#[tokio::test]
async fn test_serial_unsupported_is_error() {
    let (sink, mut rx) = ChannelSink::channel();
    let mut source = SerialTransport::new(
        Arc::new(ScriptedPortProvider::unsupported()),
        Arc::new(sink),
        SerialConfig::default(),
    );
    let mut viewer = Viewer::new(SensorGeometry::default(), true);
    let mut out = Vec::new();

    let result =
        stream_events(&mut source, &mut rx, &mut viewer, &mut out, std::future::pending::<()>()).await;
    assert!(result.is_err());

    let events = parse_events(&out);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(events[1]["state"], "disconnected");
}

#[tokio::test]
async fn test_simulator_stream_until_shutdown() {
    let (sink, mut rx) = ChannelSink::channel();
    let mut source = SimulatorSource::new(
        SimulatorConfig {
            frame_rate: 50,
            seed: Some(2024),
            ..SimulatorConfig::default()
        },
        Arc::new(sink),
    );
    let mut viewer = Viewer::new(SensorGeometry::default(), true);
    let mut out = Vec::new();

    stream_events(
        &mut source,
        &mut rx,
        &mut viewer,
        &mut out,
        tokio::time::sleep(Duration::from_millis(150)),
    )
    .await
    .unwrap();

    let events = parse_events(&out);
    assert_eq!(events.first().unwrap()["state"], "connected");
    assert_eq!(events.last().unwrap()["state"], "disconnected");

    let frames: Vec<&Value> = events.iter().filter(|e| e["type"] == "frame").collect();
    assert!(!frames.is_empty());
    for frame in frames {
        let min = frame["min"].as_f64().unwrap();
        let max = frame["max"].as_f64().unwrap();
        // 25 ± 2.5 noise plus up to 15 at the hotspot
        assert!(min >= 22.49 && max <= 42.51 && min < max, "{} {}", min, max);
    }
}
