//! Equirectangular lighting image built from the lowest-zoom tile.

use crate::texture::Texture;
use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// Horizontal shift applied to the source tile, as a fraction of a turn.
const SHIFT_TURNS: f64 = 90.0 / 360.0;

#[derive(Debug)]
pub struct EnvironmentMap {
    pub texture: Arc<Texture>,
}

impl EnvironmentMap {
    /// Crops the zoom-0 `tile` to `width × height` and rotates it a quarter
    /// turn left, wrapping the cut-off columns to the right edge. Pixels the
    /// tile doesn't cover stay transparent.
    pub fn from_tile(tile: &Texture, width: u32, height: u32) -> Self {
        let shift = (SHIFT_TURNS * width as f64).floor() as u32;
        let src = &tile.image;

        let image = RgbaImage::from_fn(width, height, |x, y| {
            let sx = (x + shift) % width;
            if sx < src.width() && y < src.height() {
                *src.get_pixel(sx, y)
            } else {
                Rgba([0, 0, 0, 0])
            }
        });

        Self {
            texture: Arc::new(Texture::new(format!("env:{}", tile.source), image)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_a_quarter_turn_with_wraparound() {
        let src = RgbaImage::from_fn(8, 2, |x, _| Rgba([x as u8, 0, 0, 255]));
        let env = EnvironmentMap::from_tile(&Texture::new("tile", src), 8, 2);

        let row: Vec<u8> = (0..8).map(|x| env.texture.image.get_pixel(x, 1)[0]).collect();
        assert_eq!(row, [2, 3, 4, 5, 6, 7, 0, 1]);
        assert_eq!(env.texture.source, "env:tile");
    }

    #[test]
    fn crops_oversized_tile_and_leaves_gaps_transparent() {
        // Tile larger than the crop in x, shorter in y.
        let src = RgbaImage::from_pixel(16, 2, Rgba([9, 9, 9, 255]));
        let env = EnvironmentMap::from_tile(&Texture::new("tile", src), 4, 4);

        assert_eq!(env.texture.width(), 4);
        assert_eq!(env.texture.image.get_pixel(0, 1)[3], 255);
        assert_eq!(env.texture.image.get_pixel(0, 3)[3], 0);
    }
}
