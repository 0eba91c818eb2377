//! Tile addressing. Official coverage uses the query-parameter endpoint, every
//! other kind the path-templated host.

use crate::config::{ConfigError, ViewerConfig};
use panoid::{CoverageKind, PanoramaDescriptor};
use reqwest::Url;

/// `cb_client` value the official endpoint expects.
const CLIENT_ID: &str = "maps_sv.tactile";

#[derive(Debug, Clone)]
pub struct TileEndpoints {
    official: Url,
    unofficial: String,
}

impl TileEndpoints {
    pub fn new(official: &str, unofficial: &str) -> Result<Self, ConfigError> {
        let official = Url::parse(official).map_err(|e| ConfigError::Url {
            field: "official tile",
            url: official.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            official,
            unofficial: unofficial.trim_end_matches('/').to_owned(),
        })
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self, ConfigError> {
        Self::new(&config.official_tile_url, &config.unofficial_tile_url)
    }

    /// URL of tile `(x, y)` at `zoom`.
    pub fn tile_url(&self, pano: &PanoramaDescriptor, x: u32, y: u32, zoom: u32) -> String {
        match pano.kind {
            CoverageKind::Official => {
                let mut url = self.official.clone();
                url.query_pairs_mut()
                    .clear()
                    .append_pair("cb_client", CLIENT_ID)
                    .append_pair("panoid", &pano.id)
                    .append_pair("x", &x.to_string())
                    .append_pair("y", &y.to_string())
                    .append_pair("zoom", &zoom.to_string())
                    // no_black_tiles: error instead of a black square out of bounds
                    .append_pair("nbt", "1")
                    // zoom_failover
                    .append_pair("fover", "2");
                url.into()
            }
            CoverageKind::Unofficial | CoverageKind::Other(_) => {
                format!("{}/x{}-y{}-z{}/{}", self.unofficial, x, y, zoom, pano.id)
            }
        }
    }
}
