//! Diagram color system.
//!
//! Colors are stored on diagram nodes and edges as `#rrggbb` strings so
//! snapshots serialize directly; `Color` does the arithmetic.

use callscope_core::StatusPattern;
use std::fmt;

/// RGB color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb`; the leading `#` is optional.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let expand = |i: usize| channel(&digits[i..i + 1]).map(|v| v * 17);
                Some(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// `hue` in degrees, `saturation` and `lightness` in `[0, 1]`.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let hue = hue.rem_euclid(360.0);
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);

        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let sector = hue / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r1, g1, b1) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(to_u8(r1), to_u8(g1), to_u8(b1))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// Color Constants
// ============================================================================

pub const COLOR_METHOD_DEFAULT: Color = Color::rgb(200, 160, 80);
pub const COLOR_CLASS_FILL: Color = Color::rgb(236, 239, 241);
pub const COLOR_LIBRARY_FILL: Color = Color::rgb(176, 190, 197);

// Step-by-step playback
pub const COLOR_STEP_PAST: Color = Color::rgb(158, 158, 158);
pub const COLOR_STEP_FUTURE: Color = Color::rgb(224, 224, 224);

// Focus
pub const COLOR_FOCUS_BORDER: Color = Color::rgb(255, 200, 100);

// Edges
pub const COLOR_EDGE_CALL: Color = Color::rgb(120, 120, 120);
pub const COLOR_EDGE_SEQUENTIAL: Color = Color::rgb(80, 130, 180);
pub const COLOR_EDGE_LIFTED: Color = Color::rgb(90, 90, 90);

pub const EDGE_WIDTH_DEFAULT: f32 = 2.0;
pub const EDGE_WIDTH_LIFTED_MAX: f32 = 30.0;

// ============================================================================
// Style Functions
// ============================================================================

/// `n` evenly spaced hues around the color wheel. Empty for `n == 0`.
pub fn generate_color_spectrum(n: usize) -> Vec<Color> {
    (0..n)
        .map(|i| Color::from_hsl(360.0 * i as f32 / n as f32, 0.7, 0.5))
        .collect()
}

/// Width of a class-to-class edge standing for `count` method calls.
pub fn lifted_edge_width(count: usize) -> f32 {
    (3.0 + count as f32 * 2.0).min(EDGE_WIDTH_LIFTED_MAX)
}

pub fn lifted_edge_label(count: usize) -> String {
    if count == 1 {
        "called 1 time".to_string()
    } else {
        format!("called {count} times")
    }
}

/// Fill for a method node: the producer's package color when it parses,
/// the default method color otherwise.
pub fn method_fill(color: &str) -> Color {
    Color::from_hex(color).unwrap_or(COLOR_METHOD_DEFAULT)
}

pub fn get_pattern_label(pattern: StatusPattern) -> &'static str {
    match pattern {
        StatusPattern::FanOut => "fan-out",
        StatusPattern::Implementation => "implementation",
        StatusPattern::Recursive => "recursive",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hex_round_trip_and_short_form() {
        let color = Color::from_hex("#1a2b3c").unwrap();
        assert_eq!(color, Color::rgb(0x1a, 0x2b, 0x3c));
        assert_eq!(color.to_hex(), "#1a2b3c");
        assert_eq!(Color::from_hex("fff"), Some(Color::rgb(255, 255, 255)));
        assert_eq!(Color::from_hex("#12"), None);
        assert_eq!(Color::from_hex("#zzzzzz"), None);
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(Color::from_hsl(0.0, 1.0, 0.5), Color::rgb(255, 0, 0));
        assert_eq!(Color::from_hsl(120.0, 1.0, 0.5), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hsl(240.0, 1.0, 0.5), Color::rgb(0, 0, 255));
        assert_eq!(Color::from_hsl(0.0, 0.0, 1.0), Color::rgb(255, 255, 255));
    }

    #[test]
    fn spectrum_has_requested_length_and_distinct_hues() {
        assert!(generate_color_spectrum(0).is_empty());
        let spectrum = generate_color_spectrum(4);
        assert_eq!(spectrum.len(), 4);
        for (i, a) in spectrum.iter().enumerate() {
            for b in &spectrum[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn lifted_width_is_capped() {
        assert_eq!(lifted_edge_width(1), 5.0);
        assert_eq!(lifted_edge_width(13), 29.0);
        assert_eq!(lifted_edge_width(14), 30.0);
        assert_eq!(lifted_edge_width(500), 30.0);
        assert_eq!(lifted_edge_label(3), "called 3 times");
    }

    proptest! {
        #[test]
        fn hex_output_parses_back(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let color = Color::rgb(r, g, b);
            prop_assert_eq!(Color::from_hex(&color.to_hex()), Some(color));
        }

        #[test]
        fn spectrum_has_requested_length(n in 0usize..64) {
            prop_assert_eq!(generate_color_spectrum(n).len(), n);
        }
    }
}
