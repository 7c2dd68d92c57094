/*!
 * VFS Watch - Main Entry Point
 *
 * Keeps a virtual file tree of one directory in sync with the disk:
 * - recursive async refresh on an interval
 * - applied events logged as they are broadcast
 * - clean shutdown on Ctrl+C
 */

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use vfs_kernel::vfs::url;
use vfs_kernel::{init_tracing, FileSystemRegistry, Observable, RefreshQueue, VfsConfig, VirtualFileTree};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let root = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VFS_WATCH_ROOT").ok())
        .map(PathBuf::from)
        .context("usage: vfs-watch <directory> (or set VFS_WATCH_ROOT)")?;
    let root = std::fs::canonicalize(&root)
        .with_context(|| format!("cannot resolve watch root {}", root.display()))?;
    if !root.is_dir() {
        bail!("watch root {} is not a directory", root.display());
    }

    let config = VfsConfig::from_env();
    info!(
        root = %root.display(),
        parallelism = config.refresh_parallelism,
        interval_ms = config.refresh_interval.as_millis() as u64,
        "vfs-watch starting"
    );

    let registry = FileSystemRegistry::with_defaults(&config);
    let tree = VirtualFileTree::with_config(registry, &config);
    let queue = RefreshQueue::new(tree.clone(), &config);

    let root_url = url::compose(url::protocols::FILE, &root.to_string_lossy());
    let watched = tree
        .find_file_by_url(&root_url)
        .with_context(|| format!("cannot load {}", root_url))?;
    // Load the whole listing so the first refresh does a full diff
    let children = watched.children();
    info!(url = %root_url, children = children.len(), "Watch root loaded");

    let mut events = tree.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(kind = event.kind(), "{}", event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut ticker = tokio::time::interval(config.refresh_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if queue.is_refresh_in_progress() {
                    debug!("Previous refresh still running, skipping tick");
                    continue;
                }
                let ticket = queue.refresh_files_async(vec![watched.clone()], true);
                // Report from a task so Ctrl+C can cancel an in-flight refresh
                tokio::spawn(async move {
                    if let Some(outcome) = ticket.finished().await {
                        debug!(session = outcome.session, events = outcome.events.len(), "Refresh done");
                    }
                });
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl+C")?;
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    queue.cancel_all();
    queue.shutdown();
    logger.abort();
    info!("vfs-watch stopped");
    Ok(())
}
