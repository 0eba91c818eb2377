//! Layout of image tiles on the projection sphere.
//!
//! Tile `(x, y)` of a zoom level covers an equal longitude/latitude sector. The
//! last column and row usually stick out past the image edge (crop sizes are not
//! multiples of the tile size), so their sectors are clamped to the sphere and
//! their UVs rescaled to show only the part of the tile that is real imagery.

use crate::geometry::Geometry;
use crate::metadata::PanoramaMetadata;
use glam::{Mat3, Vec3};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;

pub const WIDTH_SEGMENTS: u32 = 32;
pub const HEIGHT_SEGMENTS: u32 = 16;

/// Highest zoom the panorama offers, capped at `quality`.
#[inline]
pub fn select_zoom(meta: &PanoramaMetadata, quality: u32) -> u32 {
    meta.max_zoom().min(quality)
}

/// 3×3 texture-coordinate transform of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub shift_y: f32,
}

impl UvTransform {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
        shift_y: 0.0,
    };

    /// Row-major `[[scale_x, 0, 0], [0, scale_y, shift_y], [0, 0, 1]]`, applied
    /// to `(u, v, 1)`.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.scale_x, 0.0, 0.0),
            Vec3::new(0.0, self.scale_y, 0.0),
            Vec3::new(0.0, self.shift_y, 1.0),
        )
    }
}

impl Default for UvTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Memoization key of a sphere sector: the exact bit patterns of
/// `(start_lon, width_lon, start_lat, width_lat)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryKey([u64; 4]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub x: u32,
    pub y: u32,
    /// Radians east of the image's left edge.
    pub start_lon: f64,
    pub width_lon: f64,
    /// Radians down from the zenith.
    pub start_lat: f64,
    pub width_lat: f64,
    pub uv: UvTransform,
}

impl TilePlacement {
    pub fn geometry_key(&self) -> GeometryKey {
        GeometryKey([
            self.start_lon.to_bits(),
            self.width_lon.to_bits(),
            self.start_lat.to_bits(),
            self.width_lat.to_bits(),
        ])
    }
}

/// Placements for every tile of `zoom`, row by row.
pub fn plan_tiles(meta: &PanoramaMetadata, zoom: u32) -> Vec<TilePlacement> {
    let level = meta.zoom_levels[zoom.min(meta.max_zoom()) as usize];

    let slice_lon = TAU / (level.crop_width as f64 / meta.tile_width as f64);
    let slice_lat = PI / (level.crop_height as f64 / meta.tile_height as f64);

    let mut out = Vec::with_capacity((level.tiles_x * level.tiles_y) as usize);
    for y in 0..level.tiles_y {
        for x in 0..level.tiles_x {
            let start_lon = slice_lon * x as f64;
            let mut width_lon = slice_lon;
            if start_lon + width_lon > TAU {
                width_lon = TAU - start_lon;
            }

            let start_lat = slice_lat * y as f64;
            let mut width_lat = slice_lat;
            if start_lat + width_lat > PI {
                width_lat = PI - start_lat;
            }

            let mut uv = UvTransform::IDENTITY;
            if x == level.tiles_x - 1 {
                uv.scale_x = (width_lon / slice_lon) as f32;
            }
            if y == level.tiles_y - 1 {
                uv.scale_y = (width_lat / slice_lat) as f32;
                uv.shift_y = (1.0 - width_lat / slice_lat) as f32;
            }

            out.push(TilePlacement {
                x,
                y,
                start_lon,
                width_lon,
                start_lat,
                width_lat,
                uv,
            });
        }
    }
    out
}

/// Process-lifetime cache of sector geometry, shared by every panorama.
///
/// Every sector in one cache lies on the same sphere; the radius is fixed at
/// construction.
#[derive(Debug)]
pub struct GeometryCache {
    radius: f32,
    sectors: Mutex<HashMap<GeometryKey, Arc<Geometry>>>,
}

impl GeometryCache {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            sectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Geometry for `tile`, built on first use.
    pub fn sphere_sector(&self, tile: &TilePlacement) -> Arc<Geometry> {
        let radius = self.radius;
        self.sectors
            .lock()
            .entry(tile.geometry_key())
            .or_insert_with(|| {
                Arc::new(Geometry::sphere_sector(
                    radius,
                    WIDTH_SEGMENTS,
                    HEIGHT_SEGMENTS,
                    -tile.start_lon,
                    -tile.width_lon,
                    tile.start_lat,
                    tile.width_lat,
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sectors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
