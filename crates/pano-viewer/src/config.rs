use clap::Parser;
use std::time::Duration;
use streetview::config::{
    DEFAULT_METADATA_URL, DEFAULT_OFFICIAL_TILE_URL, DEFAULT_UNOFFICIAL_TILE_URL,
};
use streetview::ViewerConfig;

/// `pano_viewer` - an immersive street-view panorama viewer.
///
/// Opens a window showing the panorama given on the command line, then follows
/// `<pano_id> [heading]` and `quality <n>` lines read from stdin.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Panorama to show at startup.
    #[arg(long, env = "PANO_ID")]
    pub pano: Option<String>,

    /// Viewing heading in degrees.
    #[arg(long, env = "PANO_HEADING", default_value_t = 0.0, allow_negative_numbers = true)]
    pub heading: f64,

    /// Highest zoom level to request. Clamped to what each panorama offers.
    #[arg(long, env = "PANO_QUALITY", default_value_t = 3)]
    pub quality: u32,

    /// Length of the cross-fade between panoramas, in milliseconds.
    #[arg(long, env = "PANO_FADE_MS", default_value_t = 300)]
    pub fade_ms: u64,

    /// Metadata RPC endpoint.
    #[arg(long, env = "PANO_METADATA_URL", default_value = DEFAULT_METADATA_URL)]
    pub metadata_url: String,

    /// Tile endpoint for official coverage.
    #[arg(long, env = "PANO_OFFICIAL_TILE_URL", default_value = DEFAULT_OFFICIAL_TILE_URL)]
    pub official_tile_url: String,

    /// Tile host for all other coverage.
    #[arg(long, env = "PANO_UNOFFICIAL_TILE_URL", default_value = DEFAULT_UNOFFICIAL_TILE_URL)]
    pub unofficial_tile_url: String,

    /// Per-request HTTP timeout, in seconds.
    #[arg(long, env = "PANO_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "PANO_LOG_JSON")]
    pub log_json: bool,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

impl Config {
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            metadata_url: self.metadata_url.clone(),
            official_tile_url: self.official_tile_url.clone(),
            unofficial_tile_url: self.unofficial_tile_url.clone(),
            fade_duration: Duration::from_millis(self.fade_ms),
            quality: self.quality,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            ..ViewerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library() {
        let cfg = Config::try_parse_from(["pano_viewer"]).unwrap().viewer_config();
        let lib = ViewerConfig::default();
        assert_eq!(cfg.metadata_url, lib.metadata_url);
        assert_eq!(cfg.official_tile_url, lib.official_tile_url);
        assert_eq!(cfg.unofficial_tile_url, lib.unofficial_tile_url);
        assert_eq!(cfg.fade_duration, lib.fade_duration);
        assert_eq!(cfg.quality, lib.quality);
        assert_eq!(cfg.http_timeout, lib.http_timeout);
    }

    #[test]
    fn overrides_apply() {
        let cfg = Config::try_parse_from([
            "pano_viewer",
            "--pano",
            "abc",
            "--heading",
            "-45",
            "--quality",
            "1",
            "--fade-ms",
            "50",
        ])
        .unwrap();
        assert_eq!(cfg.pano.as_deref(), Some("abc"));
        assert_eq!(cfg.heading, -45.0);

        let vc = cfg.viewer_config();
        assert_eq!(vc.quality, 1);
        assert_eq!(vc.fade_duration, Duration::from_millis(50));
    }
}
