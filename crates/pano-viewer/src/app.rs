use crate::{
    camera::{Camera, CameraController},
    renderer::{capture, Renderer},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use streetview::HttpCompositor;
use winit::{event::WindowEvent, window::Window};

pub struct App {
    pub renderer: Renderer,
    pub camera: Camera,
    pub camera_controller: CameraController,
    pub compositor: Arc<HttpCompositor>,
}

impl App {
    pub async fn new(window: Arc<Window>, compositor: Arc<HttpCompositor>) -> Result<Self> {
        let renderer = Renderer::new(window).await?;
        let size = renderer.gfx.size;

        let mut camera = Camera::new(1.0);
        camera.set_aspect(size.width, size.height);

        Ok(Self {
            renderer,
            camera,
            camera_controller: CameraController::new(),
            compositor,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.camera.set_aspect(new_size.width, new_size.height);
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        self.camera_controller.handle_event(event, &mut self.camera);

        match event {
            WindowEvent::Resized(physical_size) => self.resize(*physical_size),
            // Hidden windows stop receiving redraws, so fades would stall.
            WindowEvent::Occluded(occluded) => {
                tracing::debug!(occluded, "Window visibility changed");
                self.compositor.set_hidden(*occluded);
            }
            _ => {}
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let frame = self.renderer.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.compositor.tick(Instant::now());
        let meshes = self.compositor.with_scene(capture);

        self.renderer.render(&swap_view, &self.camera, &meshes);
        frame.present();

        Ok(())
    }
}
