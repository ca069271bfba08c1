use serde::{Deserialize, Serialize};

use crate::error::ColorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgb565(pub u16);

impl Rgb565 {
    pub const BLACK: Self = Self(0x0000);
    pub const WHITE: Self = Self(0xFFFF);

    pub const fn from_rgb888(r: u8, g: u8, b: u8) -> Self {
        Self((((r as u16) & 0xF8) << 8) | (((g as u16) & 0xFC) << 3) | ((b as u16) >> 3))
    }

    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::InvalidHex(hex.to_string()));
        }
        let value =
            u32::from_str_radix(digits, 16).map_err(|_| ColorError::InvalidHex(hex.to_string()))?;

        Ok(Self::from_rgb888(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        ))
    }

    pub fn to_rgb888(self) -> (u8, u8, u8) {
        let r5 = u32::from(self.0 >> 11);
        let g6 = u32::from((self.0 >> 5) & 0x3F);
        let b5 = u32::from(self.0 & 0x1F);
        (
            (r5 * 255 / 31) as u8,
            (g6 * 255 / 63) as u8,
            (b5 * 255 / 31) as u8,
        )
    }

    pub fn to_hex(self) -> String {
        let (r, g, b) = self.to_rgb888();
        format!("{r:02x}{g:02x}{b:02x}")
    }
}
