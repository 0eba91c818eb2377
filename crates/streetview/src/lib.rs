//! Street-view panorama pipeline.
//!
//! Turns an opaque panorama id into a textured, oriented sphere in a small scene
//! graph and cross-fades it over whatever was shown before:
//!
//! - [`metadata`] fetches and parses the imagery service's positional-array metadata.
//! - [`tiles`] maps `(descriptor, x, y, zoom)` to a tile URL.
//! - [`projection`] lays tiles out on the sphere and memoizes sector geometry.
//! - [`compositor`] loads tiles, installs finished panoramas and guards against stale requests.
//! - [`animation`] advances the fade once per display frame.
//!
//! The host feeds [`store::PanoramaStore`] and calls [`compositor::Compositor::tick`]
//! every frame; [`driver::run_driver`] connects the two.

pub mod animation;
pub mod compositor;
pub mod config;
pub mod driver;
pub mod environment;
pub mod error_pano;
pub mod geometry;
pub mod metadata;
pub mod projection;
pub mod scene;
pub mod store;
pub mod texture;
pub mod tiles;
pub mod transport;

pub use compositor::{Compositor, RenderError, RenderOutcome};
pub use config::ViewerConfig;
pub use metadata::{PanoramaMetadata, ZoomLevel};
pub use panoid::{CoverageKind, PanoramaDescriptor};

/// Compositor wired to the real network stack.
pub type HttpCompositor = Compositor<transport::ReqwestTransport, texture::HttpTextureLoader>;

#[cfg(test)]
pub(crate) mod testing;
