//! Independent verifier for a public randomness beacon's source pulses.
//!
//! Wires a [`Config`] file into a running [`SourceManager`]: builds
//! every enabled source, starts its collector, exposes `/metrics`, and
//! drives the periodic verification loop until interrupted.

mod beacon_client;
mod config;
mod manager;
mod metrics;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verifier_core::Source;

use config::Config;
use manager::SourceManager;
use metrics::MetricsSink;
use output::OutputWriter;

#[derive(Parser, Debug)]
#[command(name = "verifier-service")]
#[command(about = "Independent verifier for a public randomness beacon's source pulses")]
struct Args {
    /// Path to the JSON deployment config file.
    #[arg(long, env = "VERIFIER_CONFIG", default_value = "config.json")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .init();

    tracing::info!(name = %config.log_name, "starting verifier service");

    let metrics = MetricsSink::install().context("installing metrics recorder")?;
    let output = OutputWriter::new(config.output_folder.clone());
    let mut manager = SourceManager::new(&config, metrics.clone(), output);

    for (name, entry) in &config.sources {
        if !entry.enabled {
            tracing::info!(source = %name, "source disabled, skipping");
            continue;
        }
        let source = build_source(name, &entry.fields)
            .with_context(|| format!("building source {name}"))?;
        manager.add_source(source);
    }

    let metrics_listen = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_router = metrics::router(metrics.clone());
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_listen)
        .await
        .with_context(|| format!("binding metrics listener on {metrics_listen}"))?;
    tracing::info!(listen = %metrics_listen, "metrics endpoint");
    let metrics_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        () = manager.run_verification_loop() => {
            tracing::error!("verification loop exited unexpectedly");
        }
        result = metrics_handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "metrics task error");
            }
        }
    }

    tracing::info!("stopping collectors");
    manager.stop().await;

    Ok(())
}

fn build_source(name: &str, fields: &serde_json::Value) -> Result<Box<dyn Source + Send + Sync>> {
    match name {
        "radio" => {
            let fields: config::RadioFields = serde_json::from_value(fields.clone())?;
            let source_config = sources::RadioConfig {
                url: fields.url,
                port: fields.port,
                prefix: fields.prefix,
            };
            Ok(Box::new(sources::RadioSource::new(source_config)))
        }
        "microblog" => {
            let fields: config::MicroblogFields = serde_json::from_value(fields.clone())?;
            let source_config = sources::MicroblogConfig {
                consumer_key: fields.consumer_key,
                consumer_secret: fields.consumer_secret,
                tweet_interval_secs: fields.tweet_interval,
                second_start: fields.second_start,
            };
            Ok(Box::new(sources::MicroblogSource::new(source_config)))
        }
        "seism" | "seismology" => {
            let fields: config::SeismFields = serde_json::from_value(fields.clone())?;
            let source_config = sources::SeismologyConfig {
                source_url: fields.source_url,
                fetch_interval_secs: fields.fetch_interval,
            };
            Ok(Box::new(sources::SeismologySource::new(source_config)))
        }
        "ethereum" => {
            let fields: config::EthereumFields = serde_json::from_value(fields.clone())?;
            let source_config = sources::EthereumConfig {
                threshold: fields.threshold,
                block_id_module: fields.block_id_module,
                tokens: sources::ethereum::EthereumTokens {
                    infura: fields.tokens.infura,
                    etherscan: fields.tokens.etherscan,
                    rivet: fields.tokens.rivet,
                },
            };
            let source = sources::EthereumSource::try_new(source_config)
                .with_context(|| "ethereum source misconfigured")?;
            Ok(Box::new(source))
        }
        other => anyhow::bail!("unknown source kind: {other}"),
    }
}
