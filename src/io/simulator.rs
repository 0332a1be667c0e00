// src/io/simulator.rs
//
// Synthetic thermal camera.
// Produces a noisy 25 °C background with a warm hotspot circling the centre of
// the sensor, formatted exactly like the camera's serial output so it can
// stand in for the hardware anywhere a ThermalSource is expected.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{ConnectOutcome, ConnectionState, DataSink, IoError, ThermalSource};
use crate::frame::SensorGeometry;

/// Background temperature in °C
const BASE_TEMPERATURE: f64 = 25.0;
/// Peak-to-peak uniform noise around the background
const NOISE_AMPLITUDE: f64 = 5.0;
/// Hotspot peak above background
const HOTSPOT_AMPLITUDE: f64 = 15.0;
/// Gaussian falloff of the hotspot per squared pixel distance
const HOTSPOT_FALLOFF: f64 = 0.1;
/// Hotspot orbit advance per frame, radians
const PHASE_STEP: f64 = 0.05;

pub const DEFAULT_FRAME_RATE: u32 = 15;

/// Simulator configuration
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub geometry: SensorGeometry,
    /// Frames per second
    pub frame_rate: u32,
    /// Fixed RNG seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            geometry: SensorGeometry::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

// ============================================================================
// Frame Generator
// ============================================================================

/// Frame generator. Holds the hotspot phase and the noise RNG.
#[derive(Clone, Debug)]
pub struct ThermalSimulator {
    geometry: SensorGeometry,
    phase: f64,
    rng: ChaCha8Rng,
}

impl ThermalSimulator {
    pub fn new(geometry: SensorGeometry, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        ThermalSimulator {
            geometry,
            phase: 0.0,
            rng,
        }
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.geometry
    }

    /// Hotspot orbit angle used for the next frame
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Hotspot centre for the current phase, in pixel coordinates
    pub fn hotspot(&self) -> (f64, f64) {
        let w = self.geometry.width as f64;
        let h = self.geometry.height as f64;
        (
            w / 2.0 + self.phase.cos() * (w / 3.0),
            h / 2.0 + self.phase.sin() * (h / 3.0),
        )
    }

    /// Generate one frame of readings in row-major order, rounded to two
    /// decimals, and advance the hotspot.
    pub fn next_values(&mut self) -> Vec<f64> {
        let (hx, hy) = self.hotspot();
        self.phase += PHASE_STEP;

        let mut values = Vec::with_capacity(self.geometry.pixel_count());
        for y in 0..self.geometry.height {
            for x in 0..self.geometry.width {
                let noise = (self.rng.gen::<f64>() - 0.5) * NOISE_AMPLITUDE;
                let dx = x as f64 - hx;
                let dy = y as f64 - hy;
                let hotspot = HOTSPOT_AMPLITUDE * (-HOTSPOT_FALLOFF * (dx * dx + dy * dy)).exp();
                let temp = BASE_TEMPERATURE + noise + hotspot;
                values.push((temp * 100.0).round() / 100.0);
            }
        }
        values
    }

    /// Generate one frame as a camera line: comma-separated, `\r` terminated.
    pub fn next_line(&mut self) -> String {
        let values = self.next_values();
        let mut line = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        line.push('\r');
        line
    }
}

// ============================================================================
// Simulator Source
// ============================================================================

struct RunningTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<ThermalSimulator>,
}

/// Periodic simulator source.
///
/// One ticker task at most. The generator moves into the task while running
/// and comes back on `stop`, so the hotspot resumes where it left off.
pub struct SimulatorSource {
    config: SimulatorConfig,
    sink: Arc<dyn DataSink>,
    state: watch::Sender<ConnectionState>,
    simulator: Option<ThermalSimulator>,
    task: Option<RunningTask>,
}

impl SimulatorSource {
    pub fn new(config: SimulatorConfig, sink: Arc<dyn DataSink>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let simulator = ThermalSimulator::new(config.geometry, config.seed);
        Self {
            config,
            sink,
            state,
            simulator: Some(simulator),
            task: None,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start emitting frames. No-op while already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let mut simulator = self
            .simulator
            .take()
            .unwrap_or_else(|| ThermalSimulator::new(self.config.geometry, self.config.seed));
        let sink = self.sink.clone();
        let period = self.config.frame_period();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        self.state.send_replace(ConnectionState::Connected);
        tlog!(
            "[simulator] Started ({}x{} @ {} fps)",
            self.config.geometry.width,
            self.config.geometry.height,
            self.config.frame_rate
        );

        let handle = tokio::spawn(async move {
            // First frame one period after start
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    // Fires on an explicit stop or when the source is dropped
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let line = simulator.next_line();
                        sink.on_data(&line);
                    }
                }
            }
            simulator
        });

        self.task = Some(RunningTask { stop_tx, handle });
    }

    /// Stop emitting frames. No-op when not running. No frame is delivered
    /// after this returns.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.stop_tx.send(());
            match task.handle.await {
                Ok(simulator) => self.simulator = Some(simulator),
                Err(e) => tlog!("[simulator] Ticker task failed: {:?}", e),
            }
            tlog!("[simulator] Stopped");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

#[async_trait]
impl ThermalSource for SimulatorSource {
    async fn start(&mut self) -> Result<ConnectOutcome, IoError> {
        SimulatorSource::start(self);
        Ok(ConnectOutcome::Connected)
    }

    async fn stop(&mut self) -> Result<(), IoError> {
        SimulatorSource::stop(self).await;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn device_type(&self) -> &'static str {
        "simulator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameParser, PIXEL_COUNT};
    use std::sync::Mutex;

    // Noise peaks at the hotspot centre reach base + noise/2 + hotspot
    const MIN_READING: f64 = BASE_TEMPERATURE - NOISE_AMPLITUDE / 2.0;
    const MAX_READING: f64 = BASE_TEMPERATURE + NOISE_AMPLITUDE / 2.0 + HOTSPOT_AMPLITUDE;

    #[test]
    fn test_reading_bounds_reachable() {
        assert_eq!(MIN_READING, 22.5);
        assert_eq!(MAX_READING, 42.5);

        // Over many frames some reading passes the plain base + hotspot peak
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(11));
        let hottest = (0..200)
            .flat_map(|_| sim.next_values())
            .fold(f64::MIN, f64::max);
        assert!(hottest > BASE_TEMPERATURE + HOTSPOT_AMPLITUDE, "hottest {}", hottest);
        assert!(hottest <= MAX_READING + 0.01);
    }

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    impl DataSink for CollectingSink {
        fn on_data(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        fn on_error(&self, _message: &str) {}
    }

    impl CollectingSink {
        fn count(&self) -> usize {
            self.lines.lock().unwrap().len()
        }
    }

    #[test]
    fn test_values_within_physical_range() {
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(7));
        for _ in 0..50 {
            let values = sim.next_values();
            assert_eq!(values.len(), PIXEL_COUNT);
            for v in values {
                assert!((MIN_READING - 0.01..=MAX_READING + 0.01).contains(&v), "out of range: {}", v);
                // Two decimal places at most
                assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_line_format() {
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(1));
        let line = sim.next_line();
        assert!(line.ends_with('\r'));
        assert!(!line.contains('\n'));
        assert_eq!(line.trim_end().split(',').count(), PIXEL_COUNT);
    }

    #[test]
    fn test_line_parses_without_zeroes() {
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(3));
        let parsed = FrameParser::default().parse(&sim.next_line()).unwrap();
        assert!(parsed.frame.pixels().iter().all(|&v| v > 0.0));
        assert!(parsed.bounds.min as f64 >= MIN_READING - 0.01);
        assert!(parsed.bounds.max as f64 <= MAX_READING + 0.01);
        assert!(parsed.bounds.max > parsed.bounds.min);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = ThermalSimulator::new(SensorGeometry::default(), Some(42));
        let mut b = ThermalSimulator::new(SensorGeometry::default(), Some(42));
        assert_eq!(a.next_line(), b.next_line());
        assert_eq!(a.next_line(), b.next_line());
    }

    #[test]
    fn test_hotspot_orbits() {
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(0));
        // Phase 0: hotspot right of centre
        let (x, y) = sim.hotspot();
        assert!((x - (16.0 + 32.0 / 3.0)).abs() < 1e-9);
        assert!((y - 12.0).abs() < 1e-9);

        sim.next_values();
        assert!((sim.phase() - PHASE_STEP).abs() < 1e-12);

        // The warmest pixel of the first frame sits at the hotspot
        let mut sim = ThermalSimulator::new(SensorGeometry::default(), Some(0));
        let values = sim.next_values();
        let (hottest, _) = values
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
        let (hx, hy) = ((hottest % 32) as f64, (hottest / 32) as f64);
        assert!((hx - 26.67).abs() <= 2.0 && (hy - 12.0).abs() <= 2.0);
    }

    #[test]
    fn test_frame_period() {
        let config = SimulatorConfig::default();
        assert_eq!(config.frame_period().as_millis(), 66);
        let zero = SimulatorConfig {
            frame_rate: 0,
            ..SimulatorConfig::default()
        };
        assert_eq!(zero.frame_period(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let sink = Arc::new(CollectingSink::default());
        let mut source = SimulatorSource::new(
            SimulatorConfig {
                frame_rate: 100,
                seed: Some(5),
                ..SimulatorConfig::default()
            },
            sink.clone(),
        );

        source.stop().await;
        assert_eq!(ThermalSource::state(&source), ConnectionState::Disconnected);

        source.start();
        source.start();
        assert!(source.is_running());
        assert_eq!(ThermalSource::state(&source), ConnectionState::Connected);

        tokio::time::sleep(Duration::from_millis(120)).await;
        source.stop().await;
        source.stop().await;
        assert!(!source.is_running());
        assert_eq!(ThermalSource::state(&source), ConnectionState::Disconnected);

        // One ticker at 100 fps: roughly 12 frames, never double that
        let emitted = sink.count();
        assert!(emitted >= 1, "no frames emitted");
        assert!(emitted <= 15, "duplicate ticker suspected: {} frames", emitted);

        // Nothing arrives after stop
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count(), emitted);
    }

    #[tokio::test]
    async fn test_phase_persists_across_restart() {
        let sink = Arc::new(CollectingSink::default());
        let mut source = SimulatorSource::new(
            SimulatorConfig {
                frame_rate: 100,
                seed: Some(9),
                ..SimulatorConfig::default()
            },
            sink.clone(),
        );

        source.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        source.stop().await;
        let emitted = sink.count();

        let phase = source.simulator.as_ref().map(|s| s.phase()).unwrap();
        assert!((phase - emitted as f64 * PHASE_STEP).abs() < 1e-9);
    }
}
