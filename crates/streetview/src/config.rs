use std::time::Duration;

/// Metadata RPC of the imagery service.
pub const DEFAULT_METADATA_URL: &str =
    "https://maps.googleapis.com/$rpc/google.internal.maps.mapsjs.v1.MapsJsInternalService/GetMetadata";
/// Query-parameter tile endpoint used for official coverage.
pub const DEFAULT_OFFICIAL_TILE_URL: &str = "https://streetviewpixels-pa.googleapis.com/v1/tile";
/// Path-templated tile host used for everything else.
pub const DEFAULT_UNOFFICIAL_TILE_URL: &str = "https://lh3.ggpht.com/jsapi2/a/b/c";

/// Tunables of the panorama pipeline.
///
/// Fade duration and quality cap differ between deployments, so neither is a
/// constant anywhere else in the crate.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub metadata_url: String,
    pub official_tile_url: String,
    pub unofficial_tile_url: String,
    /// Wall-clock length of the cross-fade between panoramas.
    pub fade_duration: Duration,
    /// Highest zoom index to request; clamped to what each panorama offers.
    pub quality: u32,
    /// Radius of the projection sphere (and half-extent of the error box).
    pub sphere_radius: f32,
    /// Per-request timeout handed to the HTTP client.
    pub http_timeout: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            metadata_url: DEFAULT_METADATA_URL.to_owned(),
            official_tile_url: DEFAULT_OFFICIAL_TILE_URL.to_owned(),
            unofficial_tile_url: DEFAULT_UNOFFICIAL_TILE_URL.to_owned(),
            fade_duration: Duration::from_millis(300),
            quality: 3,
            sphere_radius: 999.0,
            http_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{url}': {reason}")]
    Url {
        field: &'static str,
        url: String,
        reason: String,
    },
}
