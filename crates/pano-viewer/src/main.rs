//! Entry point for the panorama viewer.

use anyhow::{Context, Result};
use clap::Parser;
use pano_viewer::{app::App, config::Config, net::spawn_network};
use std::sync::Arc;
use streetview::store::{PanoramaStore, ViewerInputs};
use streetview::texture::HttpTextureLoader;
use streetview::transport::ReqwestTransport;
use streetview::HttpCompositor;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

fn main() -> Result<()> {
    let config = Config::parse();

    // Default to "info" if RUST_LOG is unset.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let viewer = config.viewer_config();
    let transport =
        ReqwestTransport::new(viewer.http_timeout).context("Failed to build metadata client")?;
    let loader =
        HttpTextureLoader::new(viewer.http_timeout).context("Failed to build tile client")?;
    let compositor = Arc::new(
        HttpCompositor::new(&viewer, transport, loader).context("Invalid viewer configuration")?,
    );

    let (store, inputs) = PanoramaStore::new(ViewerInputs {
        pano_id: config.pano.clone(),
        heading: config.heading,
        quality: config.quality,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let net = spawn_network(compositor.clone(), store, inputs, shutdown_rx);

    tracing::info!(pano_id = ?config.pano, quality = config.quality, "Starting viewer");

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Panorama Viewer")
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height))
            .build(&event_loop)?,
    );

    // Initialise the application (async → sync).
    let mut app = pollster::block_on(App::new(window.clone(), compositor))?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => {
                app.handle_event(&event);
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => match app.render() {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => {
                            app.resize(app.renderer.gfx.size);
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            tracing::error!("WGPU out of memory, exiting");
                            elwt.exit();
                        }
                        Err(e) => tracing::error!(error = ?e, "Render error"),
                    },
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    let _ = shutdown_tx.send(());
    if net.join().is_err() {
        tracing::error!("Network thread panicked");
    }
    tracing::info!("Viewer closed");

    Ok(())
}
