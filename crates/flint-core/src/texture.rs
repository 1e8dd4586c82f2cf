//! CPU-side texture data.

use crate::error::{Error, Result};

/// Bytes per RGBA8 texel.
const BYTES_PER_TEXEL: usize = 4;

/// An RGBA8 image ready to be uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Wrap tightly packed RGBA8 pixels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidTexture(format!(
                "zero-sized texture {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * BYTES_PER_TEXEL;
        if pixels.len() != expected {
            return Err(Error::InvalidTexture(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Two-colour checkerboard with square cells of `cell` texels.
    pub fn checkerboard(size: u32, cell: u32, light: [u8; 4], dark: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * BYTES_PER_TEXEL);
        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 {
                    light
                } else {
                    dark
                };
                pixels.extend_from_slice(&texel);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let white = [255, 255, 255, 255];
        let black = [0, 0, 0, 255];
        let tex = TextureData::checkerboard(4, 2, white, black);
        assert_eq!(tex.pixels().len(), 4 * 4 * 4);
        let texel = |x: usize, y: usize| &tex.pixels()[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), white);
        assert_eq!(texel(2, 0), black);
        assert_eq!(texel(2, 2), white);
    }

    #[test]
    fn rejects_mismatched_length() {
        assert!(TextureData::new(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new(0, 2, Vec::new()).is_err());
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());
    }
}
