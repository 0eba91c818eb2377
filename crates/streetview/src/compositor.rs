//! Builds panoramas from metadata and installs them into the shared scene.
//!
//! Requests overlap freely: each one takes a token from a monotonic counter when
//! it starts, and its panorama is installed only if no later request has
//! installed one already. A slow request can therefore never replace the result
//! of a faster, newer one.

use crate::animation::{self, FadeProgress, FadeState};
use crate::config::{ConfigError, ViewerConfig};
use crate::environment::EnvironmentMap;
use crate::error_pano::error_panorama;
use crate::metadata::{MetadataFetcher, PanoramaMetadata};
use crate::projection::{plan_tiles, select_zoom, GeometryCache};
use crate::scene::{Material, Mesh, ObjectId, Scene, SceneObject};
use crate::texture::{TextureError, TextureLoader};
use crate::tiles::TileEndpoints;
use crate::transport::Transport;
use futures::future::try_join_all;
use glam::Quat;
use panoid::PanoramaDescriptor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Installed(ObjectId),
    /// A newer request installed its panorama first; this one was dropped.
    Stale,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Tile(#[from] TextureError),
}

/// Normalizes degrees into `[0, 360)`.
#[inline]
fn wrap_degrees(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Orientation of a panorama viewed with `heading` (degrees).
///
/// Yaw aligns the image's centre column with the viewing heading; pitch and
/// roll undo the capture vehicle's tilt and roll. Applied yaw, then pitch,
/// then roll in the object's frame.
pub fn panorama_rotation(meta: &PanoramaMetadata, heading: f64) -> Quat {
    let yaw = wrap_degrees(360.0 + (90.0 - meta.heading) + heading).to_radians() as f32;
    let pitch = wrap_degrees(360.0 + (meta.tilt - 90.0)).to_radians() as f32;
    let roll = wrap_degrees(360.0 + meta.roll).to_radians() as f32;

    Quat::from_rotation_y(yaw) * Quat::from_rotation_z(pitch) * Quat::from_rotation_x(roll)
}

#[derive(Debug, Default)]
struct SceneState {
    scene: Scene,
    fade: FadeState,
}

pub struct Compositor<T, L> {
    metadata: MetadataFetcher<T>,
    loader: L,
    tiles: TileEndpoints,
    geometry: GeometryCache,
    state: Mutex<SceneState>,
    next_token: AtomicU64,
    quality: AtomicU32,
    /// Set while the host isn't drawing frames; installs skip the fade.
    hidden: AtomicBool,
    fade_duration: Duration,
    sphere_radius: f32,
}

impl<T: Transport, L: TextureLoader> Compositor<T, L> {
    pub fn new(config: &ViewerConfig, transport: T, loader: L) -> Result<Self, ConfigError> {
        Ok(Self {
            metadata: MetadataFetcher::new(transport, config.metadata_url.clone()),
            loader,
            tiles: TileEndpoints::from_config(config)?,
            geometry: GeometryCache::new(config.sphere_radius),
            state: Mutex::new(SceneState::default()),
            next_token: AtomicU64::new(0),
            quality: AtomicU32::new(config.quality),
            hidden: AtomicBool::new(false),
            fade_duration: config.fade_duration,
            sphere_radius: config.sphere_radius,
        })
    }

    /// Allocates the token of a new request. Later calls always return larger
    /// tokens.
    pub fn begin_request(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn quality(&self) -> u32 {
        self.quality.load(Ordering::Relaxed)
    }

    /// Zoom cap for requests started after this call.
    pub fn set_quality(&self, quality: u32) {
        self.quality.store(quality, Ordering::Relaxed);
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry
    }

    /// Loads every tile of the selected zoom and installs the panorama.
    ///
    /// Fails if any tile fails; nothing is added to the scene in that case.
    pub async fn render(
        &self,
        token: u64,
        meta: &PanoramaMetadata,
        heading: f64,
        quality: u32,
    ) -> Result<RenderOutcome, RenderError> {
        let zoom = select_zoom(meta, quality);
        let placements = plan_tiles(meta, zoom);
        let urls: Vec<String> = placements
            .iter()
            .map(|p| self.tiles.tile_url(&meta.descriptor, p.x, p.y, zoom))
            .collect();

        tracing::debug!(
            token,
            pano = %meta.descriptor,
            zoom,
            tiles = urls.len(),
            "Loading panorama tiles"
        );

        let textures = try_join_all(urls.iter().map(|url| self.loader.load(url))).await?;

        let meshes = placements
            .iter()
            .zip(textures)
            .map(|(placement, texture)| Mesh {
                geometry: self.geometry.sphere_sector(placement),
                material: Material::fading(texture, placement.uv),
                render_order: 1,
            })
            .collect();

        let object = SceneObject::panorama(panorama_rotation(meta, heading), meshes);
        let Some(id) = self.install(token, object) else {
            tracing::debug!(token, pano = %meta.descriptor, "Dropping stale panorama");
            return Ok(RenderOutcome::Stale);
        };

        tracing::info!(token, object = %id, pano = %meta.descriptor, zoom, "Panorama installed");
        self.load_environment(token, meta).await;
        Ok(RenderOutcome::Installed(id))
    }

    /// Installs the error panorama for `descriptor`.
    pub fn render_error(&self, token: u64, descriptor: &PanoramaDescriptor) -> Option<ObjectId> {
        let object = error_panorama(descriptor, self.sphere_radius);
        let id = self.install(token, object);
        match id {
            Some(id) => tracing::info!(token, object = %id, pano = %descriptor, "Error panorama installed"),
            None => tracing::debug!(token, pano = %descriptor, "Dropping stale error panorama"),
        }
        id
    }

    /// Shows panorama `id` looking towards `heading`.
    ///
    /// Every failure ends in the error panorama; `None` means the result was
    /// superseded by a newer request.
    pub async fn render_panorama_request(&self, id: &str, heading: f64) -> Option<ObjectId> {
        self.render_panorama_request_with(self.begin_request(), id, heading)
            .await
    }

    /// [`render_panorama_request`](Self::render_panorama_request) with a token
    /// taken earlier from [`begin_request`](Self::begin_request), so request
    /// order is fixed when the request is issued rather than when it first runs.
    pub async fn render_panorama_request_with(
        &self,
        token: u64,
        id: &str,
        heading: f64,
    ) -> Option<ObjectId> {
        let descriptor = panoid::decode(id);

        let Some(meta) = self.metadata.fetch(&descriptor).await else {
            return self.render_error(token, &descriptor);
        };

        match self.render(token, &meta, heading, self.quality()).await {
            Ok(RenderOutcome::Installed(id)) => Some(id),
            Ok(RenderOutcome::Stale) => None,
            Err(e) => {
                tracing::error!(error = %e, token, pano = %meta.descriptor, "Failed to render panorama");
                self.render_error(token, &meta.descriptor)
            }
        }
    }

    fn install(&self, token: u64, object: SceneObject) -> Option<ObjectId> {
        let mut guard = self.state.lock();
        let SceneState { scene, fade } = &mut *guard;
        let id = fade.install(scene, token, object, Instant::now())?;
        if self.is_hidden() {
            fade.finish(scene);
        }
        Some(id)
    }

    async fn load_environment(&self, token: u64, meta: &PanoramaMetadata) {
        let level = meta.zoom_levels[0];
        let url = self.tiles.tile_url(&meta.descriptor, 0, 0, 0);

        let tile = match self.loader.load(&url).await {
            Ok(tile) => tile,
            Err(e) => {
                tracing::warn!(error = %e, pano = %meta.descriptor, "Environment tile unavailable");
                return;
            }
        };
        let env = Arc::new(EnvironmentMap::from_tile(&tile, level.crop_width, level.crop_height));

        let mut guard = self.state.lock();
        if guard.fade.installed_token() == token {
            guard.scene.environment = Some(env);
        }
    }

    /// Advances the cross-fade. Call once per display frame.
    pub fn tick(&self, now: Instant) -> FadeProgress {
        let mut guard = self.state.lock();
        let SceneState { scene, fade } = &mut *guard;
        animation::tick(scene, fade, now, self.fade_duration)
    }

    /// Marks the host as hidden or visible. While hidden, no frames tick, so
    /// each install drops the previous panorama immediately instead of fading.
    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Relaxed);
        if hidden {
            self.remove_old_panoramas();
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Relaxed)
    }

    /// Skips any fade in progress, leaving only the newest panorama. For hosts
    /// that stop ticking while hidden.
    pub fn remove_old_panoramas(&self) {
        let mut guard = self.state.lock();
        let SceneState { scene, fade } = &mut *guard;
        fade.finish(scene);
    }

    /// Runs `f` with the scene locked. Keep it short; renders in flight wait
    /// on the same lock to install.
    pub fn with_scene<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        f(&self.state.lock().scene)
    }

    pub fn fade_started_at(&self) -> Instant {
        self.state.lock().fade.started_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::parse_metadata;
    use crate::testing::{metadata_json, FakeLoader, FakeTransport, OFFICIAL_ID};
    use glam::Vec3;
    use std::f32::consts::FRAC_PI_2;

    type TestCompositor = Compositor<FakeTransport, FakeLoader>;

    fn compositor(transport: FakeTransport, loader: FakeLoader) -> TestCompositor {
        Compositor::new(&ViewerConfig::default(), transport, loader).unwrap()
    }

    fn meta(id: &str, orientation: Option<[f64; 3]>) -> PanoramaMetadata {
        parse_metadata(&metadata_json(2, id, orientation)).unwrap()
    }

    fn panoramas(c: &TestCompositor) -> Vec<ObjectId> {
        c.with_scene(|s| s.objects().filter(|o| o.is_panorama()).map(|o| o.id).collect())
    }

    fn same_rotation(a: Quat, b: Quat) -> bool {
        // q and -q describe the same rotation.
        a.dot(b).abs() > 1.0 - 1e-6
    }

    #[test]
    fn rotation_follows_heading_tilt_and_roll() {
        // Level capture facing 90°, viewed at heading 0: no rotation.
        let m = meta(OFFICIAL_ID, Some([90.0, 90.0, 0.0]));
        assert!(same_rotation(panorama_rotation(&m, 0.0), Quat::IDENTITY));
        assert!(same_rotation(
            panorama_rotation(&m, 90.0),
            Quat::from_rotation_y(FRAC_PI_2)
        ));

        // 360 + (90 - 500) - 30 = -80, wrapped to 280.
        let m = meta(OFFICIAL_ID, Some([500.0, 80.0, -10.0]));
        let expected = Quat::from_rotation_y(280f32.to_radians())
            * Quat::from_rotation_z(350f32.to_radians())
            * Quat::from_rotation_x(350f32.to_radians());
        assert!(same_rotation(panorama_rotation(&m, -30.0), expected));
        assert_eq!(wrap_degrees(-80.0), 280.0);
    }

    #[test]
    fn rotation_order_is_yaw_pitch_roll() {
        let m = meta(OFFICIAL_ID, Some([0.0, 180.0, 90.0]));
        let q = panorama_rotation(&m, 0.0);
        // yaw 90, pitch 90, roll 90; roll is applied to the vector first.
        let expected = Quat::from_rotation_y(FRAC_PI_2)
            * Quat::from_rotation_z(FRAC_PI_2)
            * Quat::from_rotation_x(FRAC_PI_2);
        assert!((q * Vec3::Y - expected * Vec3::Y).length() < 1e-5);
        // Any other order moves +y somewhere else.
        let zyx = Quat::from_rotation_z(FRAC_PI_2)
            * Quat::from_rotation_y(FRAC_PI_2)
            * Quat::from_rotation_x(FRAC_PI_2);
        assert!((q * Vec3::Y - zyx * Vec3::Y).length() > 0.5);
    }

    #[tokio::test]
    async fn render_builds_one_transparent_mesh_per_tile() {
        let loader = FakeLoader::default();
        let c = compositor(FakeTransport::null_body(), loader.clone());
        let m = meta(OFFICIAL_ID, None);

        let token = c.begin_request();
        let outcome = c.render(token, &m, 0.0, 2).await.unwrap();
        let RenderOutcome::Installed(id) = outcome else {
            panic!("expected install, got {outcome:?}");
        };

        c.with_scene(|s| {
            let o = s.get(id).unwrap();
            assert_eq!(o.meshes.len(), 8);
            for mesh in &o.meshes {
                assert_eq!(mesh.material.opacity, 0.0);
                assert_eq!(mesh.render_order, 1);
                assert!(mesh.material.transparent);
                assert!(mesh.material.double_sided);
                assert!(!mesh.material.depth_write);
            }
            assert!(s.environment.is_some());
        });

        // 8 tiles at zoom 2 plus the zoom-0 environment tile.
        let requested = loader.requested();
        assert_eq!(requested.len(), 9);
        assert!(requested.iter().take(8).all(|u| u.contains("zoom=2")));
        assert!(requested[8].contains("x=0&y=0&zoom=0"));
    }

    #[tokio::test]
    async fn quality_is_clamped_to_max_zoom() {
        let loader = FakeLoader::default();
        let c = compositor(FakeTransport::null_body(), loader.clone());
        let m = meta(OFFICIAL_ID, None);

        c.render(c.begin_request(), &m, 0.0, 10).await.unwrap();
        // 3328 x 1664 at zoom 3: 7 x 4 tiles.
        assert_eq!(loader.requested().iter().filter(|u| u.contains("zoom=3")).count(), 28);
    }

    #[tokio::test]
    async fn tile_failure_installs_nothing() {
        let loader = FakeLoader::default();
        loader.fail("x=1&y=0&zoom=2");
        let c = compositor(FakeTransport::null_body(), loader);

        let err = c.render(c.begin_request(), &meta(OFFICIAL_ID, None), 0.0, 2).await;
        assert!(matches!(err, Err(RenderError::Tile(_))));
        assert!(panoramas(&c).is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_shows_error_panorama() {
        let c = compositor(FakeTransport::status(500), FakeLoader::default());

        let id = c.render_panorama_request(OFFICIAL_ID, 0.0).await.unwrap();
        c.with_scene(|s| {
            let o = s.get(id).unwrap();
            assert_eq!(o.meshes.len(), 1);
            assert_eq!(o.meshes[0].geometry.vertices.len(), 24);
            assert!(o.meshes[0].material.texture.source.starts_with("error:"));
        });
    }

    #[tokio::test]
    async fn tile_failure_falls_back_to_error_panorama() {
        let loader = FakeLoader::default();
        loader.fail("zoom=3");
        let transport = FakeTransport::ok(metadata_json(2, OFFICIAL_ID, None));
        let c = compositor(transport, loader);

        let id = c.render_panorama_request(OFFICIAL_ID, 0.0).await.unwrap();
        assert_eq!(panoramas(&c), [id]);
        c.with_scene(|s| assert_eq!(s.get(id).unwrap().meshes.len(), 1));
    }

    #[tokio::test]
    async fn slow_older_request_never_replaces_newer() {
        let loader = FakeLoader::default();
        loader.gate("panoid=slow");
        let c = compositor(FakeTransport::null_body(), loader.clone());
        let (slow, fast) = (meta("slow", None), meta("fast", None));

        let slow_token = c.begin_request();
        let fast_token = c.begin_request();

        let (slow_out, fast_out) = tokio::join!(
            async {
                let out = c.render(slow_token, &slow, 0.0, 1).await;
                out.unwrap()
            },
            async {
                let out = c.render(fast_token, &fast, 0.0, 1).await.unwrap();
                loader.release("panoid=slow");
                out
            },
        );

        assert!(matches!(fast_out, RenderOutcome::Installed(_)));
        assert_eq!(slow_out, RenderOutcome::Stale);

        let RenderOutcome::Installed(fast_id) = fast_out else { unreachable!() };
        assert_eq!(panoramas(&c), [fast_id]);
        c.with_scene(|s| {
            let env = s.environment.as_ref().unwrap();
            assert!(env.texture.source.contains("panoid=fast"));
        });
    }

    #[tokio::test]
    async fn fade_runs_through_tick() {
        let c = compositor(FakeTransport::null_body(), FakeLoader::default());
        let m = meta(OFFICIAL_ID, None);

        let RenderOutcome::Installed(first) = c.render(c.begin_request(), &m, 0.0, 0).await.unwrap()
        else {
            panic!("not installed");
        };
        let start = c.fade_started_at();
        assert!(matches!(c.tick(start + Duration::from_millis(150)), FadeProgress::Fading(_)));
        assert_eq!(c.tick(start + Duration::from_millis(300)), FadeProgress::Promoted(first));

        let RenderOutcome::Installed(second) = c.render(c.begin_request(), &m, 0.0, 0).await.unwrap()
        else {
            panic!("not installed");
        };
        assert_eq!(panoramas(&c).len(), 2);

        c.remove_old_panoramas();
        assert_eq!(panoramas(&c), [second]);
        c.with_scene(|s| {
            assert_eq!(s.get(second).unwrap().meshes[0].material.opacity, 1.0);
        });
    }

    #[tokio::test]
    async fn renders_without_ticks_keep_two_panoramas() {
        let c = compositor(FakeTransport::null_body(), FakeLoader::default());
        let m = meta(OFFICIAL_ID, None);

        for _ in 0..5 {
            c.render(c.begin_request(), &m, 0.0, 0).await.unwrap();
            assert!(panoramas(&c).len() <= 2);
        }
    }

    #[tokio::test]
    async fn hidden_host_keeps_only_newest_panorama() {
        let c = compositor(FakeTransport::null_body(), FakeLoader::default());
        let m = meta(OFFICIAL_ID, None);

        c.render(c.begin_request(), &m, 0.0, 0).await.unwrap();
        c.set_hidden(true);
        assert!(c.is_hidden());

        let mut last = None;
        for _ in 0..5 {
            let RenderOutcome::Installed(id) = c.render(c.begin_request(), &m, 0.0, 0).await.unwrap()
            else {
                panic!("not installed");
            };
            assert_eq!(panoramas(&c), [id]);
            last = Some(id);
        }
        let last = last.unwrap();
        c.with_scene(|s| assert_eq!(s.get(last).unwrap().meshes[0].material.opacity, 1.0));

        // Visible again: the next panorama fades in over the current one.
        c.set_hidden(false);
        c.render(c.begin_request(), &m, 0.0, 0).await.unwrap();
        assert_eq!(panoramas(&c).len(), 2);
        assert!(panoramas(&c).contains(&last));
    }

    #[tokio::test]
    async fn geometry_is_reused_between_panoramas() {
        let c = compositor(FakeTransport::null_body(), FakeLoader::default());
        let m = meta(OFFICIAL_ID, None);

        c.render(c.begin_request(), &m, 0.0, 2).await.unwrap();
        let cached = c.geometry_cache().len();
        c.render(c.begin_request(), &m, 45.0, 2).await.unwrap();
        assert_eq!(c.geometry_cache().len(), cached);
    }
}
