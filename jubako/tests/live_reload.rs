//! Watching file layers and reloading the store on change.

mod common;

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use camino::Utf8PathBuf;
use jubako::document::JsonDocument;
use jubako::layer::{MapLayer, SourceLayer};
use jubako::source::FileSource;
use jubako::watcher::WatchOptions;
use jubako::{CancellationToken, LayerOptions, Store, WatchConfig};
use rstest::rstest;
use serde_json::json;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::timeout;

use common::{AppConfig, to_anyhow};

const WAIT: Duration = Duration::from_secs(10);

/// Replace `path` atomically so a poll never sees a half-written file.
fn replace_file(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(tmp, path)?;
    Ok(())
}

async fn next_port(ports: &mut UnboundedReceiver<u16>, wanted: u16) -> Result<()> {
    loop {
        let port = timeout(WAIT, ports.recv())
            .await
            .map_err(|_| anyhow!("no reload within {WAIT:?}"))?
            .ok_or_else(|| anyhow!("subscription closed"))?;
        if port == wanted {
            return Ok(());
        }
    }
}

#[rstest]
#[case::polling(true)]
#[case::notify(false)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_changes_reload_the_store(#[case] polling: bool) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("user.json");
    fs::write(&path, r#"{"server": {"port": 9090}}"#)?;
    let utf8 = Utf8PathBuf::from_path_buf(path.clone())
        .map_err(|p| anyhow!("non UTF-8 path {}", p.display()))?;
    let source = if polling {
        FileSource::new(utf8).polling()
    } else {
        FileSource::new(utf8)
    };

    let store = Store::<AppConfig>::new();
    to_anyhow(store.add(
        MapLayer::new("defaults", json!({"server": {"host": "localhost", "port": 8080}})),
        LayerOptions::new(),
    ))?;
    to_anyhow(store.add(
        SourceLayer::new("user", source, JsonDocument),
        LayerOptions::new().with_priority(10),
    ))?;
    to_anyhow(store.load(&CancellationToken::new()).await)?;

    let (port_tx, mut ports) = unbounded_channel();
    let subscription = store.subscribe(move |config: &AppConfig| {
        port_tx.send(config.server.port).ok();
    });
    let (err_tx, mut errors) = unbounded_channel();
    let config = WatchConfig::new()
        .with_options(WatchOptions::default().with_poll_interval(Duration::from_millis(20)))
        .on_error(move |err| {
            err_tx.send(err.to_string()).ok();
        });
    let handle = to_anyhow(store.watch(config).await)?;

    replace_file(&path, r#"{"server": {"port": 9191}}"#)?;
    next_port(&mut ports, 9191).await?;
    ensure!(store.get_at("/server/port").layer_name() == Some("user"));

    replace_file(&path, "{ broken")?;
    let reported = timeout(WAIT, errors.recv())
        .await
        .map_err(|_| anyhow!("no error within {WAIT:?}"))?
        .ok_or_else(|| anyhow!("error channel closed"))?;
    ensure!(reported.starts_with("layer 'user'"), "{reported}");
    ensure!(store.get().map(|c| c.server.port) == Some(9191), "bad data is not applied");

    replace_file(&path, r#"{"server": {"port": 9292}}"#)?;
    next_port(&mut ports, 9292).await?;

    handle.stop().await;
    ensure!(!handle.is_running());
    subscription.unsubscribe();
    Ok(())
}

#[tokio::test]
async fn unsaved_edits_survive_reloads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("user.json");
    fs::write(&path, r#"{"server": {"host": "a", "port": 1}}"#)?;
    let utf8 = Utf8PathBuf::from_path_buf(path.clone())
        .map_err(|p| anyhow!("non UTF-8 path {}", p.display()))?;

    let store = Store::<AppConfig>::new();
    to_anyhow(store.add(
        SourceLayer::new("user", FileSource::new(utf8).polling(), JsonDocument),
        LayerOptions::new(),
    ))?;
    to_anyhow(store.load(&CancellationToken::new()).await)?;
    to_anyhow(store.set_to("user", "/server/host", json!("edited")))?;

    let (port_tx, mut ports) = unbounded_channel();
    let _subscription = store.subscribe(move |config: &AppConfig| {
        port_tx.send(config.server.port).ok();
    });
    let handle = to_anyhow(
        store
            .watch(WatchConfig::new().with_options(
                WatchOptions::default().with_poll_interval(Duration::from_millis(20)),
            ))
            .await,
    )?;

    replace_file(&path, r#"{"server": {"host": "b", "port": 2}}"#)?;
    next_port(&mut ports, 2).await?;
    let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
    ensure!(config.server.host == "edited", "pending edit must be re-applied");
    ensure!(store.is_dirty());

    handle.stop().await;
    Ok(())
}
