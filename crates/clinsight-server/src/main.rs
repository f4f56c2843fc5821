//! Clinsight - clinical prediction service entry point

use anyhow::Result;
use clap::Parser;
use clinsight_runtime::{KafkaConfig, KafkaPublisher, ModelRegistry, PredictionSink, RedisClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use clinsight_server::api;
use clinsight_server::config::{Config, LoggingConfig};
use clinsight_server::context::AppContext;

#[derive(Parser)]
#[command(name = "clinsight")]
#[command(version)]
#[command(about = "Clinical prediction service: no-show prediction and patient risk scoring", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, env = "CLINSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the model storage directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Start without loading or training models
    #[arg(long, env = "SKIP_MODEL_LOADING")]
    skip_models: bool,

    /// Print an example YAML configuration and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.example_config {
        println!("{}", Config::example_yaml());
        return Ok(());
    }

    let mut config = Config::default();
    if let Some(path) = &cli.config {
        config.merge(Config::load(path)?);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = cli.models_dir {
        config.models.storage_dir = dir;
    }
    if cli.skip_models {
        config.models.skip_loading = true;
    }

    init_logging(&config.logging)?;
    info!("starting clinsight prediction service");

    // Redis is mandatory: a service that cannot reach it must not come up.
    let redis = RedisClient::connect(&config.redis.url)
        .await
        .map_err(|e| anyhow::anyhow!("redis connection failed: {e}"))?;
    info!(url = %config.redis.url, "redis connected");

    // Models degrade: a failed load or train is logged by the registry and
    // surfaces through /health instead of aborting startup.
    let registry = if config.models.skip_loading {
        info!("model loading skipped");
        None
    } else {
        let registry = Arc::new(ModelRegistry::new(&config.models.storage_dir));
        registry.initialize().await;
        Some(registry)
    };

    let ctx = AppContext::new(registry.clone(), config.thresholds).with_redis(Some(redis));
    if let Some(registry) = &registry {
        for name in registry.loaded_models().await {
            ctx.metrics.set_model_loaded(&name, true);
        }
    }

    // Kafka also degrades; predictions are simply not published without it.
    let kafka: Option<Arc<dyn PredictionSink>> = match &config.kafka {
        Some(settings) => {
            let mut kafka_config = KafkaConfig::new(&settings.bootstrap_servers, &settings.topic);
            if let Some(client_id) = &settings.client_id {
                kafka_config = kafka_config.with_client_id(client_id);
            }
            match KafkaPublisher::new("predictions", kafka_config) {
                Ok(publisher) => {
                    info!(topic = %settings.topic, "kafka publisher started");
                    Some(Arc::new(publisher) as Arc<dyn PredictionSink>)
                }
                Err(e) => {
                    warn!(error = %e, "kafka publisher unavailable, continuing without it");
                    None
                }
            }
        }
        None => None,
    };
    let ctx = ctx.with_kafka(kafka.clone());

    let routes = api::routes(ctx);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let (bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });
    info!(address = %bound, "listening");
    server.await;

    if let Some(sink) = kafka {
        if let Err(e) = sink.close().await {
            warn!(error = %e, "failed to stop kafka publisher cleanly");
        }
    }
    if let Some(registry) = registry {
        registry.cleanup().await;
        info!("models persisted");
    }
    info!("shutdown complete");
    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    if config.format == "json" {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
