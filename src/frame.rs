// src/frame.rs
//
// Thermal frame model and the CSV line parser.
// A line carries one full sensor frame as comma-separated temperatures (°C),
// row-major. Parsing never fails loudly: bad values become 0.0 and short lines
// are ignored so the last good frame stays on screen.

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// MLX90640 sensor width in pixels
pub const FRAME_WIDTH: usize = 32;
/// MLX90640 sensor height in pixels
pub const FRAME_HEIGHT: usize = 24;
/// Pixels per frame for the default sensor
pub const PIXEL_COUNT: usize = FRAME_WIDTH * FRAME_HEIGHT;
/// Average characters budgeted per value on the wire
pub const CHARS_PER_VALUE: usize = 6;
/// Longest line considered for the default sensor (4608)
pub const MAX_LINE_CHARS: usize = PIXEL_COUNT * CHARS_PER_VALUE;
/// Running-minimum seed, above any plausible reading. A frame with no valid
/// value keeps it, so such a frame reports min=500, max=0.
pub const MIN_SENTINEL: f32 = 500.0;

// =============================================================================
// Types
// =============================================================================

/// Sensor dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub width: usize,
    pub height: usize,
}

impl SensorGeometry {
    pub fn new(width: usize, height: usize) -> Self {
        SensorGeometry { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Safety cap on line length for this geometry
    pub fn max_line_chars(&self) -> usize {
        self.pixel_count() * CHARS_PER_VALUE
    }
}

impl Default for SensorGeometry {
    fn default() -> Self {
        SensorGeometry::new(FRAME_WIDTH, FRAME_HEIGHT)
    }
}

/// Min/max over the valid values of one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameBounds {
    pub min: f32,
    pub max: f32,
}

impl FrameBounds {
    /// False for the all-invalid frame (min=500, max=0) and for flat frames
    pub fn has_range(&self) -> bool {
        self.min < self.max
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

/// One complete sensor frame, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    geometry: SensorGeometry,
    pixels: Vec<f32>,
}

impl Frame {
    /// Build a frame from exactly `geometry.pixel_count()` values
    pub fn from_pixels(geometry: SensorGeometry, pixels: Vec<f32>) -> Option<Self> {
        if pixels.len() != geometry.pixel_count() {
            return None;
        }
        Some(Frame { geometry, pixels })
    }

    /// Frame with every pixel set to `value`
    pub fn filled(geometry: SensorGeometry, value: f32) -> Self {
        Frame {
            geometry,
            pixels: vec![value; geometry.pixel_count()],
        }
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.geometry
    }

    pub fn width(&self) -> usize {
        self.geometry.width
    }

    pub fn height(&self) -> usize {
        self.geometry.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Temperature at column `x`, row `y`
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        self.pixels.get(y * self.geometry.width + x).copied()
    }

    /// Iterate rows top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.pixels.chunks(self.geometry.width.max(1))
    }

    pub fn into_pixels(self) -> Vec<f32> {
        self.pixels
    }
}

/// Parser output: the frame and its bounds, applied together
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFrame {
    pub frame: Frame,
    pub bounds: FrameBounds,
}

// =============================================================================
// Parser
// =============================================================================

/// Parse one wire value: optional leading minus, digits, optional fraction.
/// Surrounding whitespace (including a trailing `\r`) is ignored.
pub fn parse_reading(token: &str) -> Option<f32> {
    let token = token.trim();
    let digits = token.strip_prefix('-').unwrap_or(token);

    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }

    token.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Turns candidate lines into frames for a given sensor geometry
#[derive(Clone, Debug)]
pub struct FrameParser {
    geometry: SensorGeometry,
    max_line_chars: usize,
}

impl FrameParser {
    pub fn new(geometry: SensorGeometry) -> Self {
        FrameParser {
            geometry,
            max_line_chars: geometry.max_line_chars(),
        }
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.geometry
    }

    pub fn max_line_chars(&self) -> usize {
        self.max_line_chars
    }

    /// Parse a line into a frame.
    /// Returns `None` for an empty line or one with fewer tokens than pixels.
    pub fn parse(&self, line: &str) -> Option<ParsedFrame> {
        if line.is_empty() {
            return None;
        }

        // Cap in characters, not bytes, so a multi-byte char is never split
        let line = match line.char_indices().nth(self.max_line_chars) {
            Some((idx, _)) => &line[..idx],
            None => line,
        };

        let pixel_count = self.geometry.pixel_count();
        let mut pixels = Vec::with_capacity(pixel_count);
        let mut min = MIN_SENTINEL;
        let mut max = 0.0f32;

        for token in line.split(',').take(pixel_count) {
            match parse_reading(token) {
                Some(value) => {
                    if value > max {
                        max = value;
                    }
                    if value < min {
                        min = value;
                    }
                    pixels.push(value);
                }
                None => pixels.push(0.0),
            }
        }

        if pixels.len() < pixel_count {
            return None;
        }

        Some(ParsedFrame {
            frame: Frame {
                geometry: self.geometry,
                pixels,
            },
            bounds: FrameBounds { min, max },
        })
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        FrameParser::new(SensorGeometry::default())
    }
}

// =============================================================================
// Display State
// =============================================================================

/// The frame currently on display plus its bounds.
/// Rejected lines leave it untouched; accepted lines replace frame and bounds
/// together.
#[derive(Clone, Debug, Default)]
pub struct FrameState {
    parser: FrameParser,
    current: Option<ParsedFrame>,
    accepted: u64,
    rejected: u64,
}

impl FrameState {
    pub fn new(geometry: SensorGeometry) -> Self {
        FrameState {
            parser: FrameParser::new(geometry),
            current: None,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Apply one candidate line. Returns true when the displayed frame changed.
    pub fn apply_line(&mut self, line: &str) -> bool {
        match self.parser.parse(line) {
            Some(parsed) => {
                self.current = Some(parsed);
                self.accepted += 1;
                true
            }
            None => {
                self.rejected += 1;
                false
            }
        }
    }

    /// Clear the display (used when the source goes away)
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.current.as_ref().map(|p| &p.frame)
    }

    /// Bounds of the displayed frame, {0, 0} before any frame was accepted
    pub fn bounds(&self) -> FrameBounds {
        self.current.as_ref().map(|p| p.bounds).unwrap_or_default()
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.parser.geometry()
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_of(values: &[&str]) -> String {
        values.join(",")
    }

    fn uniform_line(value: &str) -> String {
        vec![value; PIXEL_COUNT].join(",")
    }

    #[test]
    fn test_uniform_frame() {
        let parsed = FrameParser::default().parse(&uniform_line("10")).unwrap();
        assert_eq!(parsed.frame.len(), PIXEL_COUNT);
        assert!(parsed.frame.pixels().iter().all(|&v| v == 10.0));
        assert_eq!(parsed.bounds, FrameBounds { min: 10.0, max: 10.0 });
    }

    #[test]
    fn test_invalid_token_becomes_zero() {
        let mut values = vec!["10", "20", "abc"];
        values.extend(std::iter::repeat("15").take(PIXEL_COUNT - 3));
        let parsed = FrameParser::default().parse(&line_of(&values)).unwrap();

        assert_eq!(parsed.frame.len(), PIXEL_COUNT);
        assert_eq!(parsed.frame.pixels()[0], 10.0);
        assert_eq!(parsed.frame.pixels()[1], 20.0);
        assert_eq!(parsed.frame.pixels()[2], 0.0);
        // 0.0 substitute does not count towards the bounds
        assert_eq!(parsed.bounds, FrameBounds { min: 10.0, max: 20.0 });
    }

    #[test]
    fn test_short_line_rejected() {
        let values = vec!["21.5"; PIXEL_COUNT - 1];
        assert!(FrameParser::default().parse(&line_of(&values)).is_none());
        assert!(FrameParser::default().parse("").is_none());
    }

    #[test]
    fn test_extra_tokens_ignored() {
        let mut values = vec!["30"; PIXEL_COUNT];
        values.push("99");
        let parsed = FrameParser::default().parse(&line_of(&values)).unwrap();
        assert_eq!(parsed.frame.len(), PIXEL_COUNT);
        assert_eq!(parsed.bounds.max, 30.0);
    }

    #[test]
    fn test_truncation_before_split() {
        // 768 values of "1.00000" is 7 chars + comma each, far over the cap.
        // Only the first 4608 chars are split, which is not enough tokens.
        let line = uniform_line("1.00000");
        assert!(line.chars().count() > MAX_LINE_CHARS);
        assert!(FrameParser::default().parse(&line).is_none());

        // The last token starts inside the cap but its digits sit past it
        let mut line = vec!["1"; PIXEL_COUNT - 1].join(",");
        line.push(',');
        line.push_str(&" ".repeat(MAX_LINE_CHARS));
        line.push('9');
        let parsed = FrameParser::default().parse(&line).unwrap();
        assert_eq!(parsed.frame.pixels()[PIXEL_COUNT - 1], 0.0);
        assert_eq!(parsed.bounds, FrameBounds { min: 1.0, max: 1.0 });
    }

    #[test]
    fn test_all_invalid_keeps_sentinel() {
        let parsed = FrameParser::default().parse(&uniform_line("x")).unwrap();
        assert!(parsed.frame.pixels().iter().all(|&v| v == 0.0));
        assert_eq!(parsed.bounds, FrameBounds { min: MIN_SENTINEL, max: 0.0 });
        assert!(!parsed.bounds.has_range());
    }

    #[test]
    fn test_negative_and_fractional_values() {
        let mut values = vec!["-5.25", ".5", "7."];
        values.extend(std::iter::repeat("0").take(PIXEL_COUNT - 3));
        let parsed = FrameParser::default().parse(&line_of(&values)).unwrap();
        assert_eq!(parsed.frame.pixels()[0], -5.25);
        assert_eq!(parsed.frame.pixels()[1], 0.5);
        assert_eq!(parsed.frame.pixels()[2], 7.0);
        assert_eq!(parsed.bounds.min, -5.25);
        assert_eq!(parsed.bounds.max, 7.0);
    }

    #[test]
    fn test_parse_reading_grammar() {
        assert_eq!(parse_reading("25.31"), Some(25.31));
        assert_eq!(parse_reading(" 25\r"), Some(25.0));
        assert_eq!(parse_reading("-3"), Some(-3.0));
        assert_eq!(parse_reading(""), None);
        assert_eq!(parse_reading("-"), None);
        assert_eq!(parse_reading("."), None);
        assert_eq!(parse_reading("1e3"), None);
        assert_eq!(parse_reading("NaN"), None);
        assert_eq!(parse_reading("inf"), None);
        assert_eq!(parse_reading("1.2.3"), None);
        assert_eq!(parse_reading("12abc"), None);
    }

    #[test]
    fn test_embedded_control_characters_not_stripped() {
        // Only surrounding whitespace is trimmed, a control byte in the middle
        // of a token makes that single position invalid.
        let mut values = vec!["2\u{1}3".to_string()];
        values.extend(std::iter::repeat("20".to_string()).take(PIXEL_COUNT - 1));
        let parsed = FrameParser::default().parse(&values.join(",")).unwrap();
        assert_eq!(parsed.frame.pixels()[0], 0.0);
        assert_eq!(parsed.frame.pixels()[1], 20.0);
    }

    #[test]
    fn test_frame_state_keeps_last_good_frame() {
        let mut state = FrameState::default();
        assert_eq!(state.bounds(), FrameBounds::default());
        assert!(state.frame().is_none());

        assert!(state.apply_line(&uniform_line("12")));
        assert!(!state.apply_line("1,2,3"));
        assert!(!state.apply_line(""));

        assert_eq!(state.bounds(), FrameBounds { min: 12.0, max: 12.0 });
        assert_eq!(state.frame().unwrap().get(31, 23), Some(12.0));
        assert_eq!(state.accepted(), 1);
        assert_eq!(state.rejected(), 2);

        state.reset();
        assert!(state.frame().is_none());
        assert_eq!(state.bounds(), FrameBounds::default());
    }

    #[test]
    fn test_frame_rows_and_get() {
        let pixels: Vec<f32> = (0..PIXEL_COUNT).map(|i| i as f32).collect();
        let frame = Frame::from_pixels(SensorGeometry::default(), pixels).unwrap();
        assert_eq!(frame.rows().count(), FRAME_HEIGHT);
        assert_eq!(frame.get(1, 1), Some(33.0));
        assert_eq!(frame.get(32, 0), None);
        assert!(Frame::from_pixels(SensorGeometry::default(), vec![0.0; 3]).is_none());
    }

    #[test]
    fn test_custom_geometry() {
        let parser = FrameParser::new(SensorGeometry::new(2, 2));
        assert_eq!(parser.max_line_chars(), 24);
        let parsed = parser.parse("1,2,3,4").unwrap();
        assert_eq!(parsed.frame.get(1, 1), Some(4.0));
        assert_eq!(parsed.bounds, FrameBounds { min: 1.0, max: 4.0 });
    }
}
