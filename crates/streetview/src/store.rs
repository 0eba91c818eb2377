//! Host-owned inputs of the pipeline, published through a watch channel.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerInputs {
    /// Identifier of the panorama to show; `None` until the host knows one.
    pub pano_id: Option<String>,
    /// Viewing heading in degrees.
    pub heading: f64,
    /// Zoom cap for tile requests.
    pub quality: u32,
}

pub struct PanoramaStore {
    tx: watch::Sender<ViewerInputs>,
}

impl PanoramaStore {
    pub fn new(initial: ViewerInputs) -> (Self, watch::Receiver<ViewerInputs>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    /// Moves to panorama `id`. Always notifies, so republishing the current
    /// panorama reloads it.
    pub fn show(&self, id: impl Into<String>, heading: f64) {
        let id = id.into();
        self.tx.send_modify(|inputs| {
            inputs.pano_id = Some(id);
            inputs.heading = heading;
        });
    }

    /// Notifies only if the value changes.
    pub fn set_quality(&self, quality: u32) {
        self.tx.send_if_modified(|inputs| {
            let changed = inputs.quality != quality;
            inputs.quality = quality;
            changed
        });
    }

    pub fn snapshot(&self) -> ViewerInputs {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerInputs> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (PanoramaStore, watch::Receiver<ViewerInputs>) {
        PanoramaStore::new(ViewerInputs {
            pano_id: None,
            heading: 0.0,
            quality: 3,
        })
    }

    #[test]
    fn show_always_notifies() {
        let (store, mut rx) = store();
        store.show("abc", 45.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pano_id.as_deref(), Some("abc"));

        store.show("abc", 45.0);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn unchanged_quality_is_silent() {
        let (store, mut rx) = store();
        store.set_quality(3);
        assert!(!rx.has_changed().unwrap());

        store.set_quality(1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().quality, 1);
        assert_eq!(store.snapshot().quality, 1);
    }
}
