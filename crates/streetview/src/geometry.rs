//! CPU-side mesh data in a GPU-ready layout.

use glam::Vec3;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Per-vertex data uploaded to the GPU vertex buffer.
/// Must match the vertex inputs of the panorama shader.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// `v` grows upwards (image row 0 is at `v = 1`).
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

#[derive(Debug)]
pub struct Geometry {
    pub id: GeometryId,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    fn from_parts(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            id: GeometryId(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed)),
            vertices,
            indices,
        }
    }

    /// A sector of a UV sphere.
    ///
    /// `phi` sweeps around the vertical axis, `theta` down from the north pole.
    /// Passing a negative `phi_length` sweeps the other way, which is how tiles
    /// are mirrored to be viewed from inside the sphere.
    pub fn sphere_sector(
        radius: f32,
        width_segments: u32,
        height_segments: u32,
        phi_start: f64,
        phi_length: f64,
        theta_start: f64,
        theta_length: f64,
    ) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);
        let theta_end = (theta_start + theta_length).min(PI);
        let radius = radius as f64;

        let row_len = width_segments + 1;
        let mut vertices = Vec::with_capacity((row_len * (height_segments + 1)) as usize);

        for iy in 0..=height_segments {
            let v = iy as f64 / height_segments as f64;

            // Half-step u offset at the poles so the fan triangles sample evenly.
            let u_offset = if iy == 0 && theta_start == 0.0 {
                0.5 / width_segments as f64
            } else if iy == height_segments && theta_end == PI {
                -0.5 / width_segments as f64
            } else {
                0.0
            };

            let (sin_t, cos_t) = (theta_start + v * theta_length).sin_cos();

            for ix in 0..=width_segments {
                let u = ix as f64 / width_segments as f64;
                let (sin_p, cos_p) = (phi_start + u * phi_length).sin_cos();

                let p = Vec3::new(
                    (-radius * cos_p * sin_t) as f32,
                    (radius * cos_t) as f32,
                    (radius * sin_p * sin_t) as f32,
                );

                vertices.push(Vertex {
                    position: p.to_array(),
                    normal: p.normalize_or_zero().to_array(),
                    uv: [(u + u_offset) as f32, (1.0 - v) as f32],
                });
            }
        }

        let mut indices = Vec::with_capacity((width_segments * height_segments * 6) as usize);
        for iy in 0..height_segments {
            for ix in 0..width_segments {
                let a = iy * row_len + ix + 1;
                let b = iy * row_len + ix;
                let c = (iy + 1) * row_len + ix;
                let d = (iy + 1) * row_len + ix + 1;

                if iy != 0 || theta_start > 0.0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height_segments - 1 || theta_end < PI {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        Self::from_parts(vertices, indices)
    }

    /// An axis-aligned cube of edge `size` mirrored in z, so each face reads
    /// correctly from inside.
    pub fn inverted_box(size: f32) -> Self {
        let h = size * 0.5;

        // (normal axis, u axis, v axis) per face in +x, -x, +y, -y, +z, -z order.
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mirror = Vec3::new(1.0, 1.0, -1.0);

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u_axis, v_axis) in faces {
            let base = vertices.len() as u32;
            for (u, v) in [(0.0f32, 1.0f32), (1.0, 1.0), (0.0, 0.0), (1.0, 0.0)] {
                let p = normal * h + u_axis * ((u - 0.5) * size) + v_axis * ((v - 0.5) * size);
                vertices.push(Vertex {
                    position: (p * mirror).to_array(),
                    normal: (normal * mirror).to_array(),
                    uv: [u, v],
                });
            }
            indices.extend_from_slice(&[base, base + 2, base + 1, base + 2, base + 3, base + 1]);
        }

        Self::from_parts(vertices, indices)
    }
}
