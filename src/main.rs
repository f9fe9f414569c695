mod config;
mod formatter;
mod http_client;
mod models;
mod notifier_trait;
mod notifiers;
mod retry;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use formatter::{format_ad, largest_image_url, Flavor};
use http_client::{HttpTransport, ReqwestTransport};
use models::Ad;
use notifier_trait::{NotifierRegistry, Payload};
use notifiers::{TelegramNotifier, VkNotifier};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "adcast")]
#[command(about = "Deliver classified ad notifications to Telegram and VK", long_about = None)]
struct Args {
    /// JSON file with the ad to deliver
    #[arg(long, conflicts_with = "message")]
    ad: Option<String>,

    /// Deliver this text as is instead of an ad
    #[arg(long)]
    message: Option<String>,

    /// Print the rendered ad for every platform instead of sending it
    #[arg(long, requires = "ad")]
    preview: bool,

    /// Write a template config to data/config.yaml and exit
    #[arg(long)]
    init: bool,

    /// Config file to use
    #[arg(long, default_value = config::CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        Config::create_default()?;
        eprintln!("Wrote {}; fill in your tokens and recipients", config::CONFIG_PATH);
        return Ok(());
    }

    if args.preview {
        if let Some(path) = &args.ad {
            return preview_ad(path);
        }
    }

    // Load config first (before logging is initialized)
    let config = match Config::load_from(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            eprintln!("Run with --init to create a template at {}", config::CONFIG_PATH);
            return Ok(());
        }
    };

    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let env_filter = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(env_filter)
            .init();

        tracing::info!("Logging level set to: {} (from {})", level, args.config);
    }

    let registry = build_registry(&config)?;
    tracing::info!("Registered notifiers: {:?}", registry.list_notifiers());

    match (&args.ad, &args.message) {
        (Some(path), _) => {
            let ad = read_ad(path)?;
            registry.deliver_all(Payload::Ad(&ad)).await;
        }
        (None, Some(text)) => {
            registry.deliver_all(Payload::Text(text)).await;
        }
        (None, None) => {
            tracing::warn!("Nothing to deliver: pass --ad <file.json> or --message <text>");
        }
    }

    Ok(())
}

fn build_registry(config: &Config) -> Result<NotifierRegistry> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.user_agent)?);
    let policy = config.retry_policy();
    let mut registry = NotifierRegistry::new();

    if let Some(telegram) = &config.telegram {
        let mut notifier = TelegramNotifier::new(
            transport.clone(),
            &telegram.bot_token,
            telegram.chat_ids.clone(),
            policy,
        );
        if let Some(api_base) = &telegram.api_base {
            notifier = notifier.with_api_base(api_base);
        }
        registry.register(Box::new(notifier));
    }

    if let Some(vk) = &config.vk {
        let mut notifier = VkNotifier::new(
            transport.clone(),
            &vk.access_token,
            vk.peer_ids.clone(),
            &vk.api_version,
            policy,
        );
        if let Some(api_url) = &vk.api_url {
            notifier = notifier.with_api_url(api_url);
        }
        registry.register(Box::new(notifier));
    }

    Ok(registry)
}

fn read_ad(path: &str) -> Result<Ad> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ad from {}", path))?;
    let ad = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse ad JSON in {}", path))?;
    Ok(ad)
}

/// Print what each platform would receive
fn preview_ad(path: &str) -> Result<()> {
    let ad = read_ad(path)?;

    println!("Telegram (HTML)");
    println!("{}", "=".repeat(80));
    println!("{}", format_ad(&ad, Flavor::Html));
    println!("{}", "-".repeat(80));
    println!("Photo: {:?}", largest_image_url(&ad));
    println!();
    println!("VK (plain text)");
    println!("{}", "=".repeat(80));
    println!("{}", format_ad(&ad, Flavor::Plain));
    println!("{}", "-".repeat(80));

    Ok(())
}
