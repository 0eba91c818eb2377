//! Turns store updates into render requests.

use crate::compositor::Compositor;
use crate::store::ViewerInputs;
use crate::texture::TextureLoader;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::watch;

fn dispatch<T: Transport, L: TextureLoader>(compositor: &Arc<Compositor<T, L>>, inputs: ViewerInputs) {
    compositor.set_quality(inputs.quality);

    let Some(id) = inputs.pano_id else {
        return;
    };
    // Taken before spawning: tasks may first run in any order.
    let token = compositor.begin_request();
    tracing::debug!(token, pano_id = %id, heading = inputs.heading, "Panorama requested");

    let compositor = compositor.clone();
    tokio::spawn(async move {
        compositor
            .render_panorama_request_with(token, &id, inputs.heading)
            .await;
    });
}

/// Renders the current inputs, then every update, until `shutdown` fires or
/// the store is dropped. Requests run concurrently; the compositor keeps only
/// the newest result.
pub async fn run_driver<T: Transport, L: TextureLoader>(
    compositor: Arc<Compositor<T, L>>,
    mut inputs: watch::Receiver<ViewerInputs>,
    mut shutdown: watch::Receiver<()>,
) {
    tracing::info!("Panorama driver started");
    dispatch(&compositor, inputs.borrow_and_update().clone());

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("Shutdown signal received, stopping panorama driver");
                break;
            }
            changed = inputs.changed() => {
                if changed.is_err() {
                    tracing::info!("Input store closed, stopping panorama driver");
                    break;
                }
                dispatch(&compositor, inputs.borrow_and_update().clone());
            }
        }
    }
}
