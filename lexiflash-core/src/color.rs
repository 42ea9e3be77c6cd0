use serde::{Deserialize, Serialize};
use std::fmt;

/// `#RRGGBB` colour string as exchanged with the trial service.
///
/// Equality is plain string equality: `#FFFFFF` and `#ffffff` are different
/// values, which matters for the "no special background" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexColor(String);

impl HexColor {
    pub const WHITE: &'static str = "#ffffff";
    pub const BLACK: &'static str = "#000000";
    /// Sentinel the trial service sends when a stimulus has no background.
    pub const NO_BACKGROUND: &'static str = "#FFFFFF";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn white() -> Self {
        Self::new(Self::WHITE)
    }

    pub fn black() -> Self {
        Self::new(Self::BLACK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_no_background(&self) -> bool {
        self.0 == Self::NO_BACKGROUND
    }

    pub fn rgb(&self) -> Option<[u8; 3]> {
        let hex = self.0.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some([channel(0)?, channel(2)?, channel(4)?])
    }

    pub fn rgba(&self) -> Option<[u8; 4]> {
        self.rgb().map(|[r, g, b]| [r, g, b, 255])
    }

    /// Euclidean distance in RGB space.
    pub fn distance(&self, other: &HexColor) -> Option<f64> {
        let [r1, g1, b1] = self.rgb()?;
        let [r2, g2, b2] = other.rgb()?;
        let d = |a: u8, b: u8| (a as f64 - b as f64).powi(2);
        Some((d(r1, r2) + d(g1, g2) + d(b1, b2)).sqrt())
    }

    pub fn is_light(&self) -> Option<bool> {
        let [r, g, b] = self.rgb()?;
        let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        Some(luminance > 128.0)
    }
}

impl From<&str> for HexColor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
