//! Network thread: runs the panorama driver and the stdin host bridge on a
//! dedicated runtime so the render loop never blocks on I/O.

use std::sync::Arc;
use std::thread;
use streetview::driver::run_driver;
use streetview::store::{PanoramaStore, ViewerInputs};
use streetview::HttpCompositor;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// A line of host input.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// `<pano_id> [heading]`
    Show { id: String, heading: Option<f64> },
    /// `quality <n>`
    Quality(u32),
}

pub fn parse_command(line: &str) -> Option<HostCommand> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;

    if first == "quality" {
        let q = parts.next()?.parse().ok()?;
        return parts.next().is_none().then_some(HostCommand::Quality(q));
    }

    let heading = match parts.next() {
        Some(h) => Some(h.parse().ok()?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(HostCommand::Show {
        id: first.to_owned(),
        heading,
    })
}

pub fn spawn_network(
    compositor: Arc<HttpCompositor>,
    store: PanoramaStore,
    inputs: watch::Receiver<ViewerInputs>,
    shutdown: watch::Receiver<()>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start network runtime");
                return;
            }
        };

        rt.block_on(async move {
            tokio::join!(
                run_driver(compositor, inputs, shutdown.clone()),
                read_host_commands(store, shutdown),
            );
            tracing::info!("Network thread completed normally");
        });
        // A pending stdin read sits on a blocking thread; don't wait for it.
        rt.shutdown_background();
    })
}

async fn read_host_commands(store: PanoramaStore, mut shutdown: watch::Receiver<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match parse_command(&line) {
                Some(HostCommand::Show { id, heading }) => {
                    let heading = heading.unwrap_or_else(|| store.snapshot().heading);
                    tracing::info!(pano_id = %id, heading, "Host selected panorama");
                    store.show(id, heading);
                }
                Some(HostCommand::Quality(q)) => {
                    tracing::info!(quality = q, "Host changed quality");
                    store.set_quality(q);
                }
                None if line.trim().is_empty() => {}
                None => tracing::warn!(line = %line, "Ignoring malformed host command"),
            },
            Ok(None) => {
                tracing::debug!("Host input closed");
                // Keep the store alive so the driver keeps serving the last panorama.
                let _ = shutdown.changed().await;
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read host input");
                let _ = shutdown.changed().await;
                break;
            }
        }
    }
}
