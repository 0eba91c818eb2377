//! Fakes and fixtures shared by the unit tests.

use crate::texture::{Texture, TextureError, TextureLoader};
use crate::transport::{HttpResponse, Transport, TransportError};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const OFFICIAL_ID: &str = "xJ9m2d0Nq4lB7fP1sTzYcw";

/// Metadata response shaped like the real service's: four zoom levels of a
/// 512 px tiled panorama.
pub fn metadata_json(kind: u32, id: &str, orientation: Option<[f64; 3]>) -> Value {
    let levels = json!([[[208, 416]], [[416, 832]], [[832, 1664]], [[1664, 3328]]]);

    let location = match orientation {
        Some([h, t, r]) => json!([[null, null, 52.52, 13.4], null, [h, t, r]]),
        None => json!([[null, null, 52.52, 13.4], null]),
    };

    json!([
        null,
        [[
            null,
            [kind, id],
            [null, null, [6656, 13312], [levels, [512, 512]]],
            null,
            null,
            [[null, location]]
        ]]
    ])
}

#[derive(Clone)]
enum Reply {
    Ok(Value),
    Status(u16),
    Null,
    Fail,
}

/// Transport answering every POST with the same canned reply.
#[derive(Clone)]
pub struct FakeTransport {
    reply: Reply,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeTransport {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            calls: Arc::default(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::with(Reply::Ok(body))
    }

    pub fn status(status: u16) -> Self {
        Self::with(Reply::Status(status))
    }

    pub fn null_body() -> Self {
        Self::with(Reply::Null)
    }

    pub fn failing() -> Self {
        Self::with(Reply::Fail)
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

impl Transport for FakeTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push((url.to_owned(), body));
        match &self.reply {
            Reply::Ok(v) => Ok(HttpResponse {
                status: 200,
                body: Some(v.clone()),
            }),
            Reply::Status(status) => Ok(HttpResponse {
                status: *status,
                body: None,
            }),
            Reply::Null => Ok(HttpResponse {
                status: 200,
                body: None,
            }),
            Reply::Fail => Err(serde_json::from_str::<Value>("{").unwrap_err().into()),
        }
    }
}

/// Texture loader producing small solid tiles.
///
/// URLs containing a gated substring wait until [`release`](Self::release);
/// URLs containing a failing substring error out.
#[derive(Clone, Default)]
pub struct FakeLoader {
    gates: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    failing: Arc<Mutex<Vec<String>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakeLoader {
    pub fn gate(&self, needle: &str) {
        self.gates
            .lock()
            .insert(needle.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, needle: &str) {
        if let Some(s) = self.gates.lock().get(needle) {
            s.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail(&self, needle: &str) {
        self.failing.lock().push(needle.to_owned());
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl TextureLoader for FakeLoader {
    async fn load(&self, url: &str) -> Result<Arc<Texture>, TextureError> {
        self.requested.lock().push(url.to_owned());

        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(needle, _)| url.contains(needle.as_str()))
            .map(|(_, s)| s.clone());
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        if self.failing.lock().iter().any(|n| url.contains(n.as_str())) {
            return Err(TextureError::Status {
                url: url.to_owned(),
                status: 404,
            });
        }

        // 16 px wide, left half red, right half blue.
        let image = RgbaImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        Ok(Arc::new(Texture::new(url, image)))
    }
}
