//! RGB colors as they appear in entity properties.
//!
//! Colors are stored by the host as CSS hex strings (`#rgb`, `#rrggbb`, or
//! `#rrggbbaa`, whose alpha channel is ignored). The engine only ever needs
//! three derived forms: the canonical `#rrggbb` string, an `rgba()` string
//! at a fixed alpha, and a lightened solid color.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
}

impl Color {
    /// Creates a color from its channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses a CSS hex color.
    pub fn parse_hex(s: &str) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |i: usize, width: usize| -> crate::Result<u8> {
            let raw = u8::from_str_radix(&hex[i..i + width], 16).map_err(|_| invalid())?;
            Ok(if width == 1 { raw * 17 } else { raw })
        };

        match hex.len() {
            3 | 4 => Ok(Self::rgb(channel(0, 1)?, channel(1, 1)?, channel(2, 1)?)),
            6 | 8 => Ok(Self::rgb(channel(0, 2)?, channel(2, 2)?, channel(4, 2)?)),
            _ => Err(invalid()),
        }
    }

    /// Red channel.
    #[must_use]
    pub const fn r(&self) -> u8 {
        self.r
    }

    /// Green channel.
    #[must_use]
    pub const fn g(&self) -> u8 {
        self.g
    }

    /// Blue channel.
    #[must_use]
    pub const fn b(&self) -> u8 {
        self.b
    }

    /// Canonical lowercase `#rrggbb` form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Renders the color as a CSS `rgba()` value.
    ///
    /// `alpha` is clamped to `0.0..=1.0` and printed with at most two
    /// decimals, e.g. `rgba(255,0,0,0.45)`.
    #[must_use]
    pub fn to_rgba(&self, alpha: f64) -> String {
        format!(
            "rgba({},{},{},{})",
            self.r,
            self.g,
            self.b,
            format_decimal(alpha.clamp(0.0, 1.0))
        )
    }

    /// Mixes the color toward white by `amount` (`0.0` keeps it unchanged,
    /// `1.0` yields white).
    #[must_use]
    pub fn lighten(&self, amount: f64) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        let mix = |c: u8| -> u8 {
            let c = f64::from(c);
            (c + (255.0 - c) * amount).round() as u8
        };
        Self::rgb(mix(self.r), mix(self.g), mix(self.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Formats a number with at most two decimals and no trailing zeros.
///
/// Shared by every CSS value the engine generates so that identical inputs
/// always produce byte-identical strings.
#[must_use]
pub fn format_decimal(value: f64) -> String {
    let s = format!("{value:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}
