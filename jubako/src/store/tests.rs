//! Unit tests for merging, reads, writes and live reload.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use async_trait::async_trait;
use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use super::*;
use crate::document::JsonDocument;
use crate::layer::{Layer, LayerName, MapLayer, SourceLayer};
use crate::schema::{FieldShape, Shape};
use crate::source::{BytesSource, Source};
use crate::watcher::WatchOptions;

#[derive(Debug, Deserialize, PartialEq)]
struct Server {
    host: String,
    port: u16,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Credentials {
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Config {
    server: Server,
    #[serde(default)]
    credentials: Credentials,
}

impl Schema for Server {
    fn shape() -> Shape {
        Shape::object(
            "Server",
            vec![
                FieldShape::new("host", "host", <String as Schema>::shape),
                FieldShape::new("port", "port", <u16 as Schema>::shape),
            ],
        )
    }
}

impl Schema for Credentials {
    fn shape() -> Shape {
        Shape::object(
            "Credentials",
            vec![
                FieldShape::new("api_key", "api_key", <String as Schema>::shape).sensitive(true),
                FieldShape::new("user", "user", <String as Schema>::shape),
            ],
        )
    }
}

impl Schema for Config {
    fn shape() -> Shape {
        Shape::object(
            "Config",
            vec![
                FieldShape::new("server", "server", <Server as Schema>::shape),
                FieldShape::new("credentials", "credentials", <Credentials as Schema>::shape),
            ],
        )
    }
}

fn ctx() -> CancellationToken {
    CancellationToken::new()
}

fn to_anyhow<T>(result: JubakoResult<T>) -> Result<T> {
    result.map_err(|err| anyhow!(err.to_string()))
}

fn defaults() -> MapLayer {
    MapLayer::new(
        "defaults",
        json!({"server": {"host": "localhost", "port": 8080}}),
    )
}

fn user() -> MapLayer {
    MapLayer::new("user", json!({"server": {"port": 9090}}))
}

fn priority(p: i64) -> LayerOptions {
    LayerOptions::new().with_priority(p)
}

#[fixture]
fn store() -> Store<Config> {
    Store::new()
}

fn loaded_port(store: &Store<Config>) -> Result<u16> {
    Ok(store.get().ok_or_else(|| anyhow!("not loaded"))?.server.port)
}

#[rstest]
#[tokio::test]
async fn higher_priority_wins_regardless_of_registration_order(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(user(), priority(10)))?;
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.load(&ctx()).await)?;

    let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
    ensure!(config.server.host == "localhost");
    ensure!(config.server.port == 9090);
    ensure!(store.get_at("/server/port").layer_name() == Some("user"));
    ensure!(store.get_at("/server/host").layer_name() == Some("defaults"));

    let names: Vec<String> = store
        .list_layers()
        .iter()
        .map(|info| info.name.to_string())
        .collect();
    ensure!(names == ["defaults", "user"]);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn equal_priority_later_registration_wins(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(defaults(), priority(5)))?;
    to_anyhow(store.add(user(), priority(5)))?;
    to_anyhow(store.load(&ctx()).await)?;
    ensure!(loaded_port(&store)? == 9090);
    Ok(())
}

#[rstest]
fn duplicate_layer_names_are_rejected(store: Store<Config>) {
    store.add(defaults(), priority(0)).expect("first");
    let err = store
        .add(MapLayer::empty("defaults"), priority(1))
        .expect_err("duplicate");
    assert!(matches!(err.as_ref(), JubakoError::DuplicateLayer { name } if name == "defaults"));
}

#[rstest]
fn reads_before_load_are_empty(store: Store<Config>) {
    assert!(store.get().is_none());
    assert!(store.merged().is_none());
    let cell = store.get_at("/server/port");
    assert!(!cell.exists);
    assert!(cell.layer.is_none());
    assert!(store.get_at("/credentials/api_key").sensitive);
}

#[rstest]
#[tokio::test]
async fn failed_load_keeps_previous_snapshot(store: Store<Config>) -> Result<()> {
    let remote = Arc::new(BytesSource::new("remote", r#"{"server": {"port": 7000}}"#));
    let layer = SourceLayer::shared(
        "remote",
        Arc::clone(&remote) as Arc<dyn Source>,
        Arc::new(JsonDocument),
    );
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(layer, priority(10)))?;
    to_anyhow(store.load(&ctx()).await)?;
    ensure!(loaded_port(&store)? == 7000);

    remote.replace("{ not json");
    let err = store.load(&ctx()).await.err().ok_or_else(|| anyhow!("expected failure"))?;
    ensure!(err.to_string().starts_with("layer 'remote'"), "{err}");
    ensure!(loaded_port(&store)? == 7000);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn every_failing_layer_is_reported(store: Store<Config>) -> Result<()> {
    for name in ["a", "b"] {
        let layer = SourceLayer::new(name, BytesSource::new(name, "["), JsonDocument);
        to_anyhow(store.add(layer, priority(0)))?;
    }
    let err = store.load(&ctx()).await.err().ok_or_else(|| anyhow!("expected failure"))?;
    let JubakoError::Aggregate(errors) = err.as_ref() else {
        return Err(anyhow!("expected an aggregate, got {err}"));
    };
    ensure!(errors.len() == 2);
    ensure!(errors.layers().collect::<Vec<_>>() == ["a", "b"]);
    ensure!(store.get().is_none());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn decode_failures_fail_the_load(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(MapLayer::new("bad", json!({"server": {"host": 1}})), priority(0)))?;
    let err = store.load(&ctx()).await.err().ok_or_else(|| anyhow!("expected failure"))?;
    ensure!(matches!(err.as_ref(), JubakoError::Decode { .. }), "{err}");
    Ok(())
}

async fn masked_store() -> Result<Store<Config>> {
    let store = Store::with_options(StoreOptions::new().with_mask_value("***"));
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(
        MapLayer::new(
            "secrets",
            json!({"credentials": {"api_key": "s3cr3t", "user": "svc"}}),
        ),
        priority(20).sensitive(),
    ))?;
    to_anyhow(store.load(&ctx()).await)?;
    Ok(store)
}

#[tokio::test]
async fn masking_hides_sensitive_values_only_when_asked() -> Result<()> {
    let store = masked_store().await?;

    let masked = store.get_at("/credentials/api_key");
    ensure!(masked.exists && masked.sensitive && masked.masked);
    ensure!(masked.value == json!("***"));
    ensure!(masked.layer_name() == Some("secrets"));

    let plain = store.get_at_unmasked("/credentials/api_key");
    ensure!(plain.value == json!("s3cr3t") && !plain.masked);

    let parent = store.get_at("/credentials");
    ensure!(parent.masked && !parent.sensitive);
    ensure!(parent.value == json!({"api_key": "***", "user": "svc"}));

    let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
    ensure!(config.credentials.api_key == "s3cr3t");
    Ok(())
}

#[tokio::test]
async fn walk_visits_depth_first_and_prunes() -> Result<()> {
    let store = masked_store().await?;
    let mut seen = Vec::new();
    store.walk(|node| {
        seen.push((node.path.to_owned(), node.sensitive));
        node.path != "/credentials"
    });
    ensure!(
        seen == [
            (String::new(), false),
            ("/server".to_owned(), false),
            ("/server/host".to_owned(), false),
            ("/server/port".to_owned(), false),
            ("/credentials".to_owned(), false),
        ],
        "{seen:?}"
    );

    let mut sensitive = Vec::new();
    store.walk(|node| {
        if node.sensitive {
            sensitive.push((node.path.to_owned(), node.layer.map(ToString::to_string)));
        }
        true
    });
    ensure!(sensitive == [("/credentials/api_key".to_owned(), Some("secrets".to_owned()))]);
    Ok(())
}

#[rstest]
#[case(false)]
#[case(true)]
#[tokio::test]
async fn sensitive_values_in_normal_layers(#[case] strict: bool) -> Result<()> {
    let store = Store::<Config>::with_options(StoreOptions::new().strict_sensitivity(strict));
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(
        MapLayer::new("leaky", json!({"credentials": {"api_key": "oops"}})),
        priority(1),
    ))?;
    let result = store.load(&ctx()).await;
    if strict {
        let err = result.err().ok_or_else(|| anyhow!("strict load must fail"))?;
        ensure!(err.is_sensitive_violation(), "{err}");
    } else {
        to_anyhow(result)?;
        ensure!(store.get_at_unmasked("/credentials/api_key").value == json!("oops"));
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn set_to_guards(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(
        SourceLayer::new("system", BytesSource::new("system", "{}"), JsonDocument),
        priority(1),
    ))?;
    to_anyhow(store.add(MapLayer::empty("user"), priority(10)))?;
    to_anyhow(store.add(MapLayer::empty("secrets"), priority(20).sensitive()))?;

    let err = store.set_to("user", "/server/port", json!(1)).err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::LayerNotLoaded { .. })));

    to_anyhow(store.load(&ctx()).await)?;
    let err = store.set_to("nope", "/server/port", json!(1)).err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::UnknownLayer { .. })));
    let err = store.set_to("system", "/server/port", json!(1)).err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::SaveNotSupported { .. })));
    let err = store.set_to("user", "/credentials/api_key", json!("x")).err();
    ensure!(matches!(
        err.as_deref(),
        Some(JubakoError::SensitiveFieldToNormalLayer { .. })
    ));

    to_anyhow(store.set_to("secrets", "/credentials/api_key", json!("x")))?;
    to_anyhow(store.set_to("secrets", "/credentials/user", json!("svc")))?;
    let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
    ensure!(config.credentials.api_key == "x");
    ensure!(config.credentials.user == "svc");
    Ok(())
}

#[rstest]
#[case::usize_max("/extra/18446744073709551615")]
#[case::past_the_end("/extra/3")]
#[tokio::test]
async fn set_to_rejects_out_of_range_indices(
    store: Store<Config>,
    #[case] path: &str,
) -> Result<()> {
    let data = json!({"server": {"host": "localhost", "port": 8080}, "extra": [1]});
    to_anyhow(store.add(MapLayer::new("defaults", data), priority(0)))?;
    to_anyhow(store.load(&ctx()).await)?;
    let err = store.set_to("defaults", path, json!(1)).err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::InvalidPath { .. })), "{err:?}");
    ensure!(!store.is_dirty());
    ensure!(store.get_at("/extra").value == json!([1]));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn set_to_discards_edits_that_do_not_decode(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(MapLayer::empty("user"), priority(10)))?;
    to_anyhow(store.load(&ctx()).await)?;

    let err = store.set_to("user", "/server/port", json!("eighty")).err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::Decode { .. })));
    ensure!(loaded_port(&store)? == 8080);
    ensure!(!store.is_dirty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn save_persists_and_clears_edits(store: Store<Config>) -> Result<()> {
    let bytes = Arc::new(BytesSource::new("user.json", "{}").writable());
    let layer = SourceLayer::shared(
        "user",
        Arc::clone(&bytes) as Arc<dyn Source>,
        Arc::new(JsonDocument),
    );
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(layer, priority(10)))?;
    to_anyhow(store.load(&ctx()).await)?;

    to_anyhow(store.set_to("user", "/server/port", json!(9443)))?;
    ensure!(loaded_port(&store)? == 9443);
    ensure!(store.is_dirty());
    let info = store.list_layers();
    ensure!(info.iter().any(|l| l.name == "user" && l.dirty && l.can_save));

    to_anyhow(store.save(&ctx()).await)?;
    ensure!(!store.is_dirty());
    let saved: serde_json::Value = serde_json::from_slice(&bytes.bytes())?;
    ensure!(saved == json!({"server": {"port": 9443}}));

    to_anyhow(store.save_layer(&ctx(), "user").await)?;
    let err = store.save_layer(&ctx(), "missing").await.err();
    ensure!(matches!(err.as_deref(), Some(JubakoError::UnknownLayer { .. })));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn save_conflicts_keep_edits(store: Store<Config>) -> Result<()> {
    let bytes = Arc::new(BytesSource::new("user.json", "{}").writable());
    let layer = SourceLayer::shared(
        "user",
        Arc::clone(&bytes) as Arc<dyn Source>,
        Arc::new(JsonDocument),
    );
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(layer, priority(10)))?;
    to_anyhow(store.load(&ctx()).await)?;
    to_anyhow(store.set_to("user", "/server/port", json!(9443)))?;

    bytes.replace(r#"{"server": {"host": "elsewhere"}}"#);
    let err = store.save(&ctx()).await.err().ok_or_else(|| anyhow!("expected conflict"))?;
    ensure!(err.is_source_modified(), "{err}");
    ensure!(store.is_dirty());

    to_anyhow(store.load(&ctx()).await)?;
    let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
    ensure!(config.server.host == "elsewhere" && config.server.port == 9443);
    to_anyhow(store.save(&ctx()).await)?;
    let saved: serde_json::Value = serde_json::from_slice(&bytes.bytes())?;
    ensure!(saved == json!({"server": {"host": "elsewhere", "port": 9443}}));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn subscribers_see_effective_changes_only(store: Store<Config>) -> Result<()> {
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(MapLayer::empty("user"), priority(10)))?;
    let calls = Arc::new(AtomicUsize::new(0));
    let mismatches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mismatched = Arc::clone(&mismatches);
    let reentrant = store.clone();
    let handle = store.subscribe(move |config: &Config| {
        counter.fetch_add(1, Ordering::SeqCst);
        let published = reentrant.get().map(|c| c.server.port);
        if published != Some(config.server.port) || reentrant.list_layers().len() != 2 {
            mismatched.fetch_add(1, Ordering::SeqCst);
        }
    });

    to_anyhow(store.load(&ctx()).await)?;
    ensure!(calls.load(Ordering::SeqCst) == 1);
    to_anyhow(store.load(&ctx()).await)?;
    ensure!(calls.load(Ordering::SeqCst) == 1, "unchanged reload must not notify");

    to_anyhow(store.set_to("user", "/server/port", json!(1234)))?;
    ensure!(calls.load(Ordering::SeqCst) == 2);

    handle.unsubscribe();
    to_anyhow(store.set_to("user", "/server/port", json!(4321)))?;
    ensure!(calls.load(Ordering::SeqCst) == 2);
    ensure!(mismatches.load(Ordering::SeqCst) == 0, "callback saw a stale snapshot");
    Ok(())
}

#[rstest]
fn mapping_table_lists_schema_paths(store: Store<Config>) {
    let dump = store.mapping_table();
    assert!(dump.contains("server.port -> /server/port (integer)"), "{dump}");
    assert!(dump.contains("credentials.api_key -> /credentials/api_key (string) [sensitive]"));
}

#[tokio::test(start_paused = true)]
async fn watch_reloads_and_reports_errors() -> Result<()> {
    let store = Store::<Config>::new();
    let remote = Arc::new(BytesSource::new("remote", r#"{"server": {"port": 7000}}"#));
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add_shared(
        Arc::new(SourceLayer::shared(
            "remote",
            Arc::clone(&remote) as Arc<dyn Source>,
            Arc::new(JsonDocument),
        )),
        priority(10),
    ))?;
    to_anyhow(store.load(&ctx()).await)?;

    let (port_tx, mut ports) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = store.subscribe(move |config: &Config| {
        port_tx.send(config.server.port).ok();
    });
    let (err_tx, mut errors) = tokio::sync::mpsc::unbounded_channel();
    let config = WatchConfig::new()
        .with_options(WatchOptions::default().with_poll_interval(Duration::from_secs(1)))
        .on_error(move |err| {
            err_tx.send(err.to_string()).ok();
        });
    let handle = to_anyhow(store.watch(config).await)?;
    ensure!(handle.is_running());

    remote.replace(r#"{"server": {"port": 7001}}"#);
    ensure!(ports.recv().await == Some(7001));
    ensure!(loaded_port(&store)? == 7001);
    ensure!(store.get_at("/server/port").layer_name() == Some("remote"));

    remote.replace("{");
    let reported = errors.recv().await.ok_or_else(|| anyhow!("error expected"))?;
    ensure!(reported.starts_with("layer 'remote'"), "{reported}");
    ensure!(loaded_port(&store)? == 7001);

    handle.stop().await;
    ensure!(!handle.is_running());
    handle.stop().await;
    Ok(())
}

fn add_remote(store: &Store<Config>, port: u16) -> Result<Arc<BytesSource>> {
    let remote = Arc::new(BytesSource::new("remote", remote_json(port)));
    to_anyhow(store.add_shared(
        Arc::new(SourceLayer::shared(
            "remote",
            Arc::clone(&remote) as Arc<dyn Source>,
            Arc::new(JsonDocument),
        )),
        priority(10),
    ))?;
    Ok(remote)
}

fn remote_json(port: u16) -> String {
    format!(r#"{{"server": {{"port": {port}}}}}"#)
}

fn port_channel(store: &Store<Config>) -> (Unsubscribe, mpsc::UnboundedReceiver<u16>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = store.subscribe(move |config: &Config| {
        tx.send(config.server.port).ok();
    });
    (handle, rx)
}

async fn next_port(ports: &mut mpsc::UnboundedReceiver<u16>) -> Result<u16> {
    tokio::time::timeout(Duration::from_secs(10), ports.recv())
        .await
        .map_err(|_| anyhow!("no reload within 10s"))?
        .ok_or_else(|| anyhow!("subscriber dropped"))
}

fn one_second_polls() -> WatchConfig {
    WatchConfig::new().with_options(WatchOptions::default().with_poll_interval(Duration::from_secs(1)))
}

#[tokio::test(start_paused = true)]
async fn watcher_follows_source_after_explicit_load() -> Result<()> {
    let store = Store::<Config>::new();
    to_anyhow(store.add(defaults(), priority(0)))?;
    let remote = add_remote(&store, 7000)?;
    to_anyhow(store.load(&ctx()).await)?;
    let handle = to_anyhow(store.watch(one_second_polls()).await)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (_subscription, mut ports) = port_channel(&store);

    remote.replace(remote_json(7001));
    to_anyhow(store.load(&ctx()).await)?;
    ensure!(next_port(&mut ports).await? == 7001);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    remote.replace(remote_json(7000));
    ensure!(next_port(&mut ports).await? == 7000, "store kept the port picked up by load");
    ensure!(loaded_port(&store)? == 7000);
    handle.stop().await;
    Ok(())
}

/// Layer whose loads wait for a permit.
#[derive(Debug)]
struct GatedLayer {
    name: LayerName,
    gate: Arc<Notify>,
}

#[async_trait]
impl Layer for GatedLayer {
    fn name(&self) -> &LayerName {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "gated"
    }

    async fn load(&self, ctx: &CancellationToken) -> JubakoResult<Value> {
        tokio::select! {
            () = self.gate.notified() => Ok(json!({})),
            () = ctx.cancelled() => Err(Arc::new(crate::JubakoError::Cancelled)),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn slow_load_does_not_overwrite_newer_watch_result() -> Result<()> {
    let store = Store::<Config>::new();
    let gate = Arc::new(Notify::new());
    to_anyhow(store.add(defaults(), priority(0)))?;
    to_anyhow(store.add(
        GatedLayer {
            name: LayerName::new("gated"),
            gate: Arc::clone(&gate),
        },
        priority(5),
    ))?;
    let remote = add_remote(&store, 7000)?;
    gate.notify_one();
    to_anyhow(store.load(&ctx()).await)?;
    let handle = to_anyhow(store.watch(one_second_polls()).await)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (_subscription, mut ports) = port_channel(&store);

    let loader = tokio::spawn({
        let store = store.clone();
        async move { store.load(&CancellationToken::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    ensure!(!loader.is_finished(), "load should wait for the gated layer");

    remote.replace(remote_json(7001));
    ensure!(next_port(&mut ports).await? == 7001);

    gate.notify_one();
    to_anyhow(loader.await?)?;
    ensure!(loaded_port(&store)? == 7001, "stale load replaced a newer tree");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    ensure!(loaded_port(&store)? == 7001);
    ensure!(ports.try_recv().is_err(), "no further change expected");
    handle.stop().await;
    Ok(())
}
