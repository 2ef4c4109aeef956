//! Color parsing and formatting for indicator cells.

use std::fmt;

/// A 24-bit RGB cell color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(0xFF, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 0xFF, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 0xFF);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Scale each channel by `brightness / 255`.
    pub fn scaled(self, brightness: u8) -> Self {
        let scale = |c: u8| ((c as u16 * brightness as u16 + 127) / 255) as u8;
        Color {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    pub fn is_off(self) -> bool {
        self == Color::OFF
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_color(*self))
    }
}

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"`, `"orange"`, `"amber"`,
///   `"yellow"`, `"purple"`, `"magenta"`, `"cyan"`, `"off"`/`"black"`
pub fn parse_color(s: &str) -> crate::error::Result<Color> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Color::RED),
        "green" => return Ok(Color::GREEN),
        "blue" => return Ok(Color::BLUE),
        "white" => return Ok(Color::rgb(0xFF, 0xFF, 0xFF)),
        "orange" => return Ok(Color::rgb(0xFF, 0x80, 0x00)),
        "amber" => return Ok(Color::rgb(0xFF, 0xBF, 0x00)),
        "yellow" => return Ok(Color::rgb(0xFF, 0xFF, 0x00)),
        "purple" => return Ok(Color::rgb(0x80, 0x00, 0xFF)),
        "magenta" => return Ok(Color::rgb(0xFF, 0x00, 0xFF)),
        "cyan" => return Ok(Color::rgb(0x00, 0xFF, 0xFF)),
        "off" | "black" => return Ok(Color::OFF),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(crate::BusyIndicatorError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(crate::BusyIndicatorError::Color(format!(
            "Invalid hex color: {s}"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| crate::BusyIndicatorError::Color(format!("Invalid hex color: {s}")))?;
    Ok(Color::rgb((val >> 16) as u8, (val >> 8) as u8, val as u8))
}

/// Format a color as `#RRGGBB`.
pub fn format_color(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}
