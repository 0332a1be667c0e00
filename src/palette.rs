// src/palette.rs
//
// Temperature → colour mapping shared by the viewers.
// Hues run from cyan (180°) at the frame minimum to red (360°) at the maximum,
// fully saturated at 50% lightness.

use serde::Serialize;

use crate::frame::{Frame, FrameBounds};

/// Hue at the frame minimum
pub const HUE_MIN: f32 = 180.0;
/// Hue at the frame maximum
pub const HUE_MAX: f32 = 360.0;
/// Lowest hue ever produced (values below the minimum)
pub const HUE_FLOOR: f32 = 160.0;
/// Number of stops in the legend bar
pub const LEGEND_STOPS: usize = 6;

/// 8-bit RGB colour
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Linear remap. A degenerate input range maps to the middle of the output.
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    if in_min == in_max {
        return (out_min + out_max) / 2.0;
    }
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Hue for a temperature within the given bounds, clamped to [160, 360]
pub fn temperature_hue(temperature: f32, bounds: &FrameBounds) -> f32 {
    map_range(temperature, bounds.min, bounds.max, HUE_MIN, HUE_MAX).clamp(HUE_FLOOR, HUE_MAX)
}

/// HSL to RGB. `hue` in degrees, `saturation` and `lightness` in [0, 1].
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Rgb {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = lightness - c / 2.0;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb(to_byte(r), to_byte(g), to_byte(b))
}

/// Display colour for one pixel
pub fn temperature_color(temperature: f32, bounds: &FrameBounds) -> Rgb {
    hsl_to_rgb(temperature_hue(temperature, bounds), 1.0, 0.5)
}

/// One legend entry
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LegendStop {
    pub temperature: f32,
    pub color: Rgb,
}

/// Evenly spaced legend stops from min to max.
/// Empty when the bounds have no usable range (nothing meaningful to show).
pub fn legend(bounds: &FrameBounds, stops: usize) -> Vec<LegendStop> {
    if !bounds.has_range() || stops < 2 {
        return Vec::new();
    }

    let interval = bounds.span() / (stops - 1) as f32;
    (0..stops)
        .map(|i| {
            let temperature = bounds.min + i as f32 * interval;
            LegendStop {
                temperature,
                color: temperature_color(temperature, bounds),
            }
        })
        .collect()
}

/// 3×3 box average, the "smooth pixels" view. Edge pixels average over the
/// neighbours that exist.
pub fn smooth(frame: &Frame) -> Frame {
    let width = frame.width();
    let height = frame.height();
    let src = frame.pixels();
    let mut out = Vec::with_capacity(src.len());

    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    sum += src[ny * width + nx];
                    count += 1;
                }
            }
            out.push(sum / count as f32);
        }
    }

    Frame::from_pixels(frame.geometry(), out).unwrap_or_else(|| frame.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SensorGeometry;

    #[test]
    fn test_map_range() {
        assert_eq!(map_range(5.0, 0.0, 10.0, 0.0, 100.0), 50.0);
        assert_eq!(map_range(20.0, 20.0, 30.0, 180.0, 360.0), 180.0);
        // Degenerate range maps to the midpoint
        assert_eq!(map_range(7.0, 3.0, 3.0, 180.0, 360.0), 270.0);
    }

    #[test]
    fn test_hue_clamped() {
        let bounds = FrameBounds { min: 20.0, max: 30.0 };
        assert_eq!(temperature_hue(20.0, &bounds), 180.0);
        assert_eq!(temperature_hue(30.0, &bounds), 360.0);
        assert_eq!(temperature_hue(0.0, &bounds), HUE_FLOOR);
        assert_eq!(temperature_hue(100.0, &bounds), HUE_MAX);
    }

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), Rgb(255, 0, 0));
        assert_eq!(hsl_to_rgb(360.0, 1.0, 0.5), Rgb(255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), Rgb(0, 255, 0));
        assert_eq!(hsl_to_rgb(180.0, 1.0, 0.5), Rgb(0, 255, 255));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), Rgb(0, 0, 255));
        assert_eq!(Rgb(0, 255, 255).to_hex(), "#00ffff");
    }

    #[test]
    fn test_legend_stops() {
        let bounds = FrameBounds { min: 20.0, max: 30.0 };
        let stops = legend(&bounds, LEGEND_STOPS);
        assert_eq!(stops.len(), 6);
        assert_eq!(stops[0].temperature, 20.0);
        assert_eq!(stops[5].temperature, 30.0);
        assert_eq!(stops[0].color, Rgb(0, 255, 255));
        assert_eq!(stops[5].color, Rgb(255, 0, 0));

        assert!(legend(&FrameBounds { min: 10.0, max: 10.0 }, LEGEND_STOPS).is_empty());
        assert!(legend(&FrameBounds::default(), LEGEND_STOPS).is_empty());
    }

    #[test]
    fn test_smooth_uniform_frame_unchanged() {
        let frame = Frame::filled(SensorGeometry::default(), 25.0);
        let smoothed = smooth(&frame);
        assert!(smoothed.pixels().iter().all(|&v| (v - 25.0).abs() < 1e-4));
    }

    #[test]
    fn test_smooth_spreads_hotspot() {
        let geometry = SensorGeometry::new(3, 3);
        let mut pixels = vec![0.0; 9];
        pixels[4] = 9.0;
        let frame = Frame::from_pixels(geometry, pixels).unwrap();
        let smoothed = smooth(&frame);
        assert_eq!(smoothed.get(1, 1), Some(1.0));
        // Corner sees the centre among its 4 neighbours
        assert_eq!(smoothed.get(0, 0), Some(9.0 / 4.0));
    }
}
