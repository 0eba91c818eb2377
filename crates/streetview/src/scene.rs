//! Minimal scene graph: a flat list of named, oriented groups of meshes.

use crate::environment::EnvironmentMap;
use crate::geometry::Geometry;
use crate::projection::UvTransform;
use crate::texture::Texture;
use glam::Quat;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name carried by every panorama object. The fade tick prunes stray objects
/// by this tag.
pub const PANORAMA_TAG: &str = "panorama";

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub texture: Arc<Texture>,
    pub uv: UvTransform,
    pub opacity: f32,
    pub transparent: bool,
    pub double_sided: bool,
    pub depth_write: bool,
}

impl Material {
    /// Fully transparent, double sided, blended without writing depth.
    pub fn fading(texture: Arc<Texture>, uv: UvTransform) -> Self {
        Self {
            texture,
            uv,
            opacity: 0.0,
            transparent: true,
            double_sided: true,
            depth_write: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Material,
    /// Lower draws first.
    pub render_order: i32,
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: &'static str,
    pub rotation: Quat,
    pub meshes: Vec<Mesh>,
}

impl SceneObject {
    pub fn panorama(rotation: Quat, meshes: Vec<Mesh>) -> Self {
        Self {
            id: ObjectId::next(),
            name: PANORAMA_TAG,
            rotation,
            meshes,
        }
    }

    pub fn is_panorama(&self) -> bool {
        self.name == PANORAMA_TAG
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        for mesh in &mut self.meshes {
            mesh.material.opacity = opacity;
        }
    }

    pub fn set_render_order(&mut self, order: i32) {
        for mesh in &mut self.meshes {
            mesh.render_order = order;
        }
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id;
        self.objects.push(object);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let idx = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(idx))
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn retain(&mut self, keep: impl FnMut(&SceneObject) -> bool) {
        self.objects.retain(keep);
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn object() -> SceneObject {
        let texture = Arc::new(Texture::new("t", RgbaImage::new(1, 1)));
        let geometry = Arc::new(Geometry::inverted_box(1.0));
        let mesh = Mesh {
            geometry,
            material: Material::fading(texture, UvTransform::IDENTITY),
            render_order: 1,
        };
        SceneObject::panorama(Quat::IDENTITY, vec![mesh.clone(), mesh])
    }

    #[test]
    fn add_get_remove() {
        let mut scene = Scene::new();
        let a = scene.add(object());
        let b = scene.add(object());
        assert_ne!(a, b);
        assert_eq!(scene.len(), 2);

        assert!(scene.remove(a).is_some());
        assert!(scene.remove(a).is_none());
        assert!(!scene.contains(a));
        assert!(scene.contains(b));
    }

    #[test]
    fn opacity_and_order_apply_to_every_mesh() {
        let mut o = object();
        assert!(o.is_panorama());
        o.set_opacity(0.4);
        o.set_render_order(0);
        assert!(o.meshes.iter().all(|m| m.material.opacity == 0.4));
        assert!(o.meshes.iter().all(|m| m.render_order == 0));
    }
}
