pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod queue;
pub mod services;

use tokio::signal;

use anyhow::Context;
pub use config::Config;
use db::Store;
use services::Scheduler;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let mut log_level = config.general.log_level.clone();
    if config.general.suppress_connection_errors {
        log_level.push_str(",reqwest::retry=off,hyper_util=off");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key, value)?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" | "daemon" | "-d" | "--daemon" => run_daemon(config, prometheus_handle).await,

        "sweep" => run_single_sweep(config).await,

        "logs" => {
            let limit = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
            cmd_logs(&config, limit).await
        }

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Parlor - Chat Backend Service");
    println!("Mobile-number login, chatrooms, and asynchronous AI replies");
    println!();
    println!("USAGE:");
    println!("  parlor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  serve             Run the API server with workers and scheduler");
    println!("  sweep             Remove expired verification codes and exit");
    println!("  logs [n]          Show recent system log entries (default: 20)");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  parlor init                       # Write config.toml");
    println!("  parlor serve                      # Start the service");
    println!("  parlor sweep                      # One-off housekeeping run");
    println!("  parlor logs 50                    # Last 50 system log rows");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the generation endpoint, quotas, etc.");
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Parlor v{} starting in server mode...",
        env!("CARGO_PKG_VERSION")
    );

    let api_state = api::create_app_state_from_config(config.clone(), prometheus_handle).await?;

    let scheduler = Scheduler::new(
        api_state.store.clone(),
        config.scheduler.clone(),
        api_state.event_bus.clone(),
    );

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler error: {}", e);
        }
    });

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api_state);
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("🌐 API server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Server running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Server stopped");

    Ok(())
}

async fn run_single_sweep(config: Config) -> anyhow::Result<()> {
    info!("Running single sweep...");

    let store = Store::new(&config.general.database_path).await?;
    let (event_bus, _) = tokio::sync::broadcast::channel(16);
    let scheduler = Scheduler::new(store, config.scheduler.clone(), event_bus);

    let removed = scheduler.run_once().await?;

    println!("Sweep complete. {} expired codes removed.", removed);
    Ok(())
}

async fn cmd_logs(config: &Config, limit: u64) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let logs = store.recent_system_logs(limit).await?;

    if logs.is_empty() {
        println!("No system logs recorded.");
        return Ok(());
    }

    println!("Recent System Logs (last {}):", logs.len());
    println!("{:-<70}", "");

    for log in logs {
        println!(
            "[{}] {} {} - {}",
            log.created_at, log.level, log.event_type, log.message
        );
    }

    Ok(())
}
