//! Decoded tile images and the loader seam that produces them.

use image::RgbaImage;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle; renderers key their GPU uploads by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An sRGB RGBA8 image ready for upload.
#[derive(Debug)]
pub struct Texture {
    pub id: TextureId,
    /// Where the pixels came from (URL or a synthetic label).
    pub source: String,
    pub image: RgbaImage,
}

impl Texture {
    pub fn new(source: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            id: TextureId::next(),
            source: source.into(),
            image,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("couldn't load tile {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("couldn't load tile {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("couldn't decode tile {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
}

/// Resolves a URL to a decoded texture. One call per tile; implementations may
/// run many loads concurrently.
pub trait TextureLoader: Send + Sync + 'static {
    fn load(&self, url: &str) -> impl Future<Output = Result<Arc<Texture>, TextureError>> + Send;
}

/// Fetches tiles over HTTP and decodes them with `image`.
#[derive(Debug, Clone)]
pub struct HttpTextureLoader {
    client: reqwest::Client,
}

impl HttpTextureLoader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl TextureLoader for HttpTextureLoader {
    async fn load(&self, url: &str) -> Result<Arc<Texture>, TextureError> {
        let request_err = |source| TextureError::Request {
            url: url.to_owned(),
            source,
        };

        let resp = self.client.get(url).send().await.map_err(request_err)?;
        if !resp.status().is_success() {
            return Err(TextureError::Status {
                url: url.to_owned(),
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(request_err)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|source| TextureError::Decode {
                url: url.to_owned(),
                source,
            })?
            .to_rgba8();

        tracing::trace!(url, width = image.width(), height = image.height(), "Tile decoded");
        Ok(Arc::new(Texture::new(url, image)))
    }
}
