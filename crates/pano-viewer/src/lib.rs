//! Desktop viewer for street-view panoramas.
//!
//! Renders the `streetview` scene with wgpu and lets the mouse look around
//! from the centre of the sphere. Panorama selection arrives over stdin.

pub mod app;
pub mod camera;
pub mod config;
pub mod net;
pub mod renderer;
