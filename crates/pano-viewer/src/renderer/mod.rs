//! Owns the GPU context and the panorama pipeline, and turns a scene snapshot
//! into a frame.

pub mod context;
pub mod panorama;

use self::{context::GfxContext, panorama::PanoramaPipeline};
use crate::camera::Camera;
use glam::Mat4;
use std::sync::Arc;
use streetview::scene::{Mesh, ObjectId, Scene};
use winit::window::Window;

/// Background behind and between panoramas, `#7f7f7f`.
const CLEAR_SRGB: u8 = 0x7f;

fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// One mesh as it will be drawn this frame.
#[derive(Debug, Clone)]
pub struct FrameMesh {
    /// Scene object and mesh index; keys the per-mesh GPU uniform.
    pub key: (ObjectId, usize),
    pub model: Mat4,
    pub mesh: Mesh,
}

/// Copies the drawable part of `scene` so the lock can be released before any
/// GPU work. Meshes come back in draw order: ascending render order, ties in
/// scene order.
pub fn capture(scene: &Scene) -> Vec<FrameMesh> {
    let mut frame: Vec<FrameMesh> = scene
        .objects()
        .flat_map(|obj| {
            let model = Mat4::from_quat(obj.rotation);
            obj.meshes.iter().enumerate().map(move |(i, mesh)| FrameMesh {
                key: (obj.id, i),
                model,
                mesh: mesh.clone(),
            })
        })
        .collect();
    frame.sort_by_key(|m| m.mesh.render_order);
    frame
}

/// Owns all rendering-related state.
pub struct Renderer {
    pub gfx: GfxContext,
    pub panorama: PanoramaPipeline,
    clear: wgpu::Color,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let panorama = PanoramaPipeline::new(&gfx.device, gfx.config.format);

        let grey = srgb_to_linear(CLEAR_SRGB);
        let clear = wgpu::Color {
            r: grey,
            g: grey,
            b: grey,
            a: 1.0,
        };

        Ok(Self {
            gfx,
            panorama,
            clear,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.gfx.resize(new_size);
    }

    pub fn render(&mut self, swap_view: &wgpu::TextureView, camera: &Camera, frame: &[FrameMesh]) {
        self.panorama
            .prepare(&self.gfx.device, &self.gfx.queue, camera, frame);

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Panorama Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.panorama.draw(&mut pass);
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
    }
}
