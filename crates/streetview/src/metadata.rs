//! Panorama metadata: request payload, positional-array parsing and the fetcher.
//!
//! The service answers with deeply nested arrays and no field names. Every index
//! path the crate depends on lives in [`paths`]; nothing else indexes into the
//! response.

use crate::transport::{Transport, TransportError};
use panoid::{CoverageKind, PanoramaDescriptor};
use serde_json::Value;

/// Orientation reported when the service omits it: facing ahead, level.
pub const DEFAULT_HEADING: f64 = 0.0;
pub const DEFAULT_TILT: f64 = 90.0;
pub const DEFAULT_ROLL: f64 = 0.0;

/// One resolution tier of a panorama.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLevel {
    pub crop_width: u32,
    pub crop_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl ZoomLevel {
    pub fn new(crop_width: u32, crop_height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            crop_width,
            crop_height,
            tiles_x: crop_width.div_ceil(tile_width),
            tiles_y: crop_height.div_ceil(tile_height),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaMetadata {
    pub descriptor: PanoramaDescriptor,
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees clockwise from north of the image's centre column.
    pub heading: f64,
    /// Degrees; 90 is level.
    pub tilt: f64,
    pub roll: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Ordered from lowest (index 0) to highest resolution. Never empty.
    pub zoom_levels: Vec<ZoomLevel>,
}

impl PanoramaMetadata {
    #[inline]
    pub fn max_zoom(&self) -> u32 {
        self.zoom_levels.len() as u32 - 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("missing field {field} at {path:?}")]
    Missing {
        field: &'static str,
        path: &'static [usize],
    },
    #[error("field {field} at {path:?} has unexpected type")]
    Type {
        field: &'static str,
        path: &'static [usize],
    },
    #[error("panorama has no zoom levels")]
    NoZoomLevels,
    #[error("tile size must be non-zero")]
    ZeroTileSize,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Index paths into the metadata response.
pub mod paths {
    pub const PANO_KIND: &[usize] = &[1, 0, 1, 0];
    pub const PANO_ID: &[usize] = &[1, 0, 1, 1];
    pub const IMAGE_HEIGHT: &[usize] = &[1, 0, 2, 2, 0];
    pub const IMAGE_WIDTH: &[usize] = &[1, 0, 2, 2, 1];
    /// Array of levels; each level is `[[crop_height, crop_width], ...]`.
    pub const ZOOM_LEVELS: &[usize] = &[1, 0, 2, 3, 0];
    pub const TILE_HEIGHT: &[usize] = &[1, 0, 2, 3, 1, 0];
    pub const TILE_WIDTH: &[usize] = &[1, 0, 2, 3, 1, 1];
    /// `[[_, _, lat, lng, ...], _, [heading, tilt, roll], ...]`
    pub const LOCATION: &[usize] = &[1, 0, 5, 0, 1];
    pub const LATITUDE: &[usize] = &[1, 0, 5, 0, 1, 0, 2];
    pub const LONGITUDE: &[usize] = &[1, 0, 5, 0, 1, 0, 3];
    pub const ORIENTATION: &[usize] = &[1, 0, 5, 0, 1, 2];

    /// Relative to one zoom level entry.
    pub const LEVEL_CROP_HEIGHT: &[usize] = &[0, 0];
    pub const LEVEL_CROP_WIDTH: &[usize] = &[0, 1];
}

fn at<'a>(
    root: &'a Value,
    field: &'static str,
    path: &'static [usize],
) -> Result<&'a Value, MetadataError> {
    path.iter()
        .try_fold(root, |v, &i| v.get(i))
        .ok_or(MetadataError::Missing { field, path })
}

fn f64_at(root: &Value, field: &'static str, path: &'static [usize]) -> Result<f64, MetadataError> {
    at(root, field, path)?
        .as_f64()
        .ok_or(MetadataError::Type { field, path })
}

fn u32_at(root: &Value, field: &'static str, path: &'static [usize]) -> Result<u32, MetadataError> {
    at(root, field, path)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(MetadataError::Type { field, path })
}

fn str_at<'a>(
    root: &'a Value,
    field: &'static str,
    path: &'static [usize],
) -> Result<&'a str, MetadataError> {
    at(root, field, path)?
        .as_str()
        .ok_or(MetadataError::Type { field, path })
}

/// Builds the RPC payload selecting data categories 1 (image geometry) and 4
/// (location and orientation).
pub fn request_body(descriptor: &PanoramaDescriptor) -> String {
    let id = Value::String(descriptor.id.clone());
    format!(
        r#"[["apiv3"],["en","US"],[[[{},{}]]],[[1,4]]]"#,
        descriptor.kind.to_wire(),
        id
    )
}

/// Parses a successful metadata response.
pub fn parse_metadata(meta: &Value) -> Result<PanoramaMetadata, MetadataError> {
    let kind = u32_at(meta, "pano kind", paths::PANO_KIND)?;
    let id = str_at(meta, "pano id", paths::PANO_ID)?;

    let tile_width = u32_at(meta, "tile width", paths::TILE_WIDTH)?;
    let tile_height = u32_at(meta, "tile height", paths::TILE_HEIGHT)?;
    if tile_width == 0 || tile_height == 0 {
        return Err(MetadataError::ZeroTileSize);
    }

    let levels = at(meta, "zoom levels", paths::ZOOM_LEVELS)?
        .as_array()
        .ok_or(MetadataError::Type {
            field: "zoom levels",
            path: paths::ZOOM_LEVELS,
        })?;

    let zoom_levels = levels
        .iter()
        .map(|level| {
            let crop_width = u32_at(level, "crop width", paths::LEVEL_CROP_WIDTH)?;
            let crop_height = u32_at(level, "crop height", paths::LEVEL_CROP_HEIGHT)?;
            Ok(ZoomLevel::new(crop_width, crop_height, tile_width, tile_height))
        })
        .collect::<Result<Vec<_>, MetadataError>>()?;

    if zoom_levels.is_empty() {
        return Err(MetadataError::NoZoomLevels);
    }

    // Short location records carry no orientation.
    let has_orientation = at(meta, "location", paths::LOCATION)?
        .as_array()
        .is_some_and(|a| a.len() >= 3);

    let (heading, tilt, roll) = if has_orientation {
        let o = at(meta, "orientation", paths::ORIENTATION)?;
        (
            f64_at(o, "heading", &[0])?,
            f64_at(o, "tilt", &[1])?,
            f64_at(o, "roll", &[2])?,
        )
    } else {
        (DEFAULT_HEADING, DEFAULT_TILT, DEFAULT_ROLL)
    };

    Ok(PanoramaMetadata {
        descriptor: PanoramaDescriptor::new(CoverageKind::from_wire(kind), id),
        latitude: f64_at(meta, "latitude", paths::LATITUDE)?,
        longitude: f64_at(meta, "longitude", paths::LONGITUDE)?,
        heading,
        tilt,
        roll,
        image_width: u32_at(meta, "image width", paths::IMAGE_WIDTH)?,
        image_height: u32_at(meta, "image height", paths::IMAGE_HEIGHT)?,
        tile_width,
        tile_height,
        zoom_levels,
    })
}

/// Fetches metadata through an injected [`Transport`].
pub struct MetadataFetcher<T> {
    transport: T,
    url: String,
}

impl<T: Transport> MetadataFetcher<T> {
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Like [`fetch`](Self::fetch) but keeps the failure reason.
    ///
    /// `Ok(None)` means the service answered without usable data (non-200 or
    /// null body).
    pub async fn try_fetch(
        &self,
        descriptor: &PanoramaDescriptor,
    ) -> Result<Option<PanoramaMetadata>, MetadataError> {
        let resp = self
            .transport
            .post_json(&self.url, request_body(descriptor))
            .await?;

        if resp.status != 200 {
            tracing::warn!(status = resp.status, %descriptor, "Metadata request rejected");
            return Ok(None);
        }

        match resp.body {
            Some(body) => parse_metadata(&body).map(Some),
            None => {
                tracing::warn!(%descriptor, "Metadata response had no body");
                Ok(None)
            }
        }
    }

    /// Returns `None` on any failure; the caller renders a fallback.
    pub async fn fetch(&self, descriptor: &PanoramaDescriptor) -> Option<PanoramaMetadata> {
        match self.try_fetch(descriptor).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::error!(error = %e, %descriptor, "Failed to fetch panorama metadata");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{metadata_json, FakeTransport, OFFICIAL_ID};
    use serde_json::json;

    #[test]
    fn parses_geometry_and_orientation() {
        let json = metadata_json(2, OFFICIAL_ID, Some([30.0, 95.0, -2.0]));
        let meta = parse_metadata(&json).unwrap();

        assert_eq!(meta.descriptor.kind, CoverageKind::Official);
        assert_eq!(meta.descriptor.id, OFFICIAL_ID);
        assert_eq!((meta.image_width, meta.image_height), (13312, 6656));
        assert_eq!((meta.tile_width, meta.tile_height), (512, 512));
        assert_eq!((meta.heading, meta.tilt, meta.roll), (30.0, 95.0, -2.0));
        assert_eq!((meta.latitude, meta.longitude), (52.52, 13.4));
        assert_eq!(meta.zoom_levels.len(), 4);
        assert_eq!(meta.max_zoom(), 3);
    }

    #[test]
    fn tile_counts_round_up() {
        let json = metadata_json(2, OFFICIAL_ID, None);
        let meta = parse_metadata(&json).unwrap();

        let z2 = meta.zoom_levels[2];
        assert_eq!((z2.crop_width, z2.crop_height), (1664, 832));
        assert_eq!(z2.tiles_x, 4);
        assert_eq!(z2.tiles_y, 2);

        let z0 = meta.zoom_levels[0];
        assert_eq!((z0.tiles_x, z0.tiles_y), (1, 1));
    }

    #[test]
    fn short_location_defaults_orientation() {
        let json = metadata_json(10, "AF1QipExample", None);
        let meta = parse_metadata(&json).unwrap();

        assert_eq!(meta.descriptor.kind, CoverageKind::Unofficial);
        assert_eq!(meta.heading, DEFAULT_HEADING);
        assert_eq!(meta.tilt, DEFAULT_TILT);
        assert_eq!(meta.roll, DEFAULT_ROLL);
    }

    #[test]
    fn malformed_response_is_an_error() {
        let err = parse_metadata(&json!([null, [[null, ["x"]]]])).unwrap_err();
        assert!(matches!(err, MetadataError::Missing { .. } | MetadataError::Type { .. }));
    }

    #[test]
    fn body_embeds_kind_and_escaped_id() {
        let d = PanoramaDescriptor::new(CoverageKind::Unofficial, "a\"b");
        assert_eq!(
            request_body(&d),
            r#"[["apiv3"],["en","US"],[[[10,"a\"b"]]],[[1,4]]]"#
        );
        let parsed: Value = serde_json::from_str(&request_body(&d)).unwrap();
        assert_eq!(parsed[2][0][0][1], "a\"b");
    }

    #[tokio::test]
    async fn non_200_and_null_bodies_yield_none() {
        let d = PanoramaDescriptor::new(CoverageKind::Official, OFFICIAL_ID);

        let fetcher = MetadataFetcher::new(FakeTransport::status(500), "http://meta");
        assert!(fetcher.fetch(&d).await.is_none());

        let fetcher = MetadataFetcher::new(FakeTransport::null_body(), "http://meta");
        assert!(fetcher.fetch(&d).await.is_none());

        let fetcher = MetadataFetcher::new(FakeTransport::failing(), "http://meta");
        assert!(fetcher.fetch(&d).await.is_none());
    }

    #[tokio::test]
    async fn fetch_posts_payload_and_parses() {
        let d = PanoramaDescriptor::new(CoverageKind::Official, OFFICIAL_ID);
        let transport = FakeTransport::ok(metadata_json(2, OFFICIAL_ID, None));
        let fetcher = MetadataFetcher::new(transport.clone(), "http://meta");

        let meta = fetcher.fetch(&d).await.unwrap();
        assert_eq!(meta.descriptor, d);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://meta");
        assert_eq!(calls[0].1, request_body(&d));
    }
}
