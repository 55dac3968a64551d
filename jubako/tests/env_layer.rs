//! Environment layers feeding a typed store.

mod common;

use anyhow::{Result, anyhow, ensure};
use jubako::layer::{EnvLayer, MapLayer};
use jubako::{CancellationToken, LayerOptions, Store, StoreOptions};
use rstest::rstest;
use serde_json::json;

use common::{AppConfig, to_anyhow};

fn with_jail<F>(f: F) -> Result<()>
where
    F: FnOnce(&mut figment::Jail) -> Result<()>,
{
    figment::Jail::try_with(|jail| {
        jail.clear_env();
        f(jail).map_err(|err| figment::Error::from(err.to_string()))
    })?;
    Ok(())
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

fn defaults() -> MapLayer {
    MapLayer::new(
        "defaults",
        json!({"server": {"host": "localhost", "port": 8080}}),
    )
}

#[rstest]
fn prefixed_and_bound_variables_override_defaults() -> Result<()> {
    with_jail(|jail| {
        jail.set_env("APP_SERVER__PORT", "9000");
        jail.set_env("APP_SERVER__TAGS", "blue, green");
        jail.set_env("DATABASE_URL", "postgres://db/app");
        jail.set_env("DATABASE_PASSWORD", "from-env");
        block_on(async {
            let store = Store::<AppConfig>::new();
            to_anyhow(store.add(defaults(), LayerOptions::new()))?;
            to_anyhow(store.add(
                EnvLayer::prefixed("env", "APP_").with_schema::<AppConfig>(),
                LayerOptions::new().with_priority(50).sensitive(),
            ))?;
            to_anyhow(store.load(&CancellationToken::new()).await)?;

            let config = store.get().ok_or_else(|| anyhow!("not loaded"))?;
            ensure!(config.server.host == "localhost");
            ensure!(config.server.port == 9000);
            ensure!(config.server.tags == ["blue", "green"]);
            ensure!(config.database.url == "postgres://db/app");
            ensure!(config.database.password == "from-env");
            ensure!(store.get_at("/server/port").layer_name() == Some("env"));
            ensure!(store.get_at("/server/host").layer_name() == Some("defaults"));
            Ok(())
        })
    })
}

#[rstest]
#[case::lenient(false)]
#[case::strict(true)]
fn secrets_from_a_normal_env_layer(#[case] strict: bool) -> Result<()> {
    with_jail(|jail| {
        jail.set_env("DATABASE_PASSWORD", "leaked");
        block_on(async {
            let store =
                Store::<AppConfig>::with_options(StoreOptions::new().strict_sensitivity(strict));
            to_anyhow(store.add(defaults(), LayerOptions::new()))?;
            to_anyhow(store.add(
                EnvLayer::new("env").with_schema::<AppConfig>(),
                LayerOptions::new().with_priority(50),
            ))?;
            let result = store.load(&CancellationToken::new()).await;
            if strict {
                let err = result.err().ok_or_else(|| anyhow!("strict load must fail"))?;
                ensure!(err.is_sensitive_violation(), "{err}");
                ensure!(store.get().is_none());
            } else {
                to_anyhow(result)?;
                ensure!(store.get().is_some_and(|c| c.database.password == "leaked"));
            }
            Ok(())
        })
    })
}

#[rstest]
fn malformed_bound_values_name_the_variable() -> Result<()> {
    with_jail(|jail| {
        jail.set_env("PORT", "eighty");
        block_on(async {
            let store = Store::<AppConfig>::new();
            to_anyhow(store.add(defaults(), LayerOptions::new()))?;
            to_anyhow(store.add(
                EnvLayer::new("env").bind("PORT", "/server/port"),
                LayerOptions::new().with_priority(50),
            ))?;
            let err = store
                .load(&CancellationToken::new())
                .await
                .err()
                .ok_or_else(|| anyhow!("expected a decode failure"))?;
            ensure!(err.to_string().contains("failed to decode"), "{err}");
            Ok(())
        })
    })
}

#[rstest]
fn environment_layers_are_read_only() -> Result<()> {
    with_jail(|_| {
        block_on(async {
            let store = Store::<AppConfig>::new();
            to_anyhow(store.add(defaults(), LayerOptions::new()))?;
            to_anyhow(store.add(EnvLayer::prefixed("env", "APP_"), LayerOptions::new()))?;
            to_anyhow(store.load(&CancellationToken::new()).await)?;
            let err = store
                .set_to("env", "/server/port", json!(1))
                .err()
                .ok_or_else(|| anyhow!("env layers cannot be written"))?;
            ensure!(err.to_string().contains("does not support saving"), "{err}");
            Ok(())
        })
    })
}
