//! precache - pre-cache a fixed set of assets and serve them cache-first.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use precache::{
    Agent, AppConfig, CacheStorage, DiskStorage, HttpFetcher, Installer, Manifest, MemoryStorage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serve,
    Install,
    List,
}

#[derive(Debug)]
struct CliArgs {
    mode: Mode,
    config_path: PathBuf,
    origin: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    bucket: Option<String>,
    memory: bool,
}

fn print_usage() {
    eprintln!("Usage: precache [MODE] [OPTIONS]");
    eprintln!();
    eprintln!("Modes:");
    eprintln!("  (default)           Install the manifest, then serve requests cache-first");
    eprintln!("  --install           Install the manifest and exit");
    eprintln!("  --list              Print the keys stored in the bucket and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>     Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  --origin <URL>      Origin assets are fetched from");
    eprintln!("  --bucket <NAME>     Cache bucket name");
    eprintln!("  --host <HOST>       Bind address (default: 127.0.0.1)");
    eprintln!("  --port <PORT>       Bind port");
    eprintln!("  --memory            Keep the bucket in memory instead of on disk");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment: PRECACHE_ORIGIN, PRECACHE_PORT, STATE_DIRECTORY, RUST_LOG");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs {
        mode: Mode::Serve,
        config_path: AppConfig::default_path(),
        origin: None,
        host: None,
        port: None,
        bucket: None,
        memory: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .unwrap_or_else(|| fail(&format!("{flag} requires a value")))
        };
        match arg.as_str() {
            "--install" => cli.mode = Mode::Install,
            "--list" => cli.mode = Mode::List,
            "--memory" => cli.memory = true,
            "--config" => cli.config_path = PathBuf::from(value("--config")),
            "--origin" => cli.origin = Some(value("--origin")),
            "--bucket" => cli.bucket = Some(value("--bucket")),
            "--host" => cli.host = Some(value("--host")),
            "--port" => {
                let port = value("--port");
                cli.port = Some(
                    port.parse()
                        .unwrap_or_else(|_| fail(&format!("invalid port: {port}"))),
                );
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                fail(&format!("unknown argument: {other}"));
            }
        }
    }
    cli
}

fn load_config(cli: &CliArgs) -> precache::Result<AppConfig> {
    let mut config = AppConfig::load_or_create(&cli.config_path)?.apply_env();
    log::info!("Loaded config from {}", cli.config_path.display());

    if let Some(origin) = &cli.origin {
        config.agent.origin.clone_from(origin);
    }
    if let Some(bucket) = &cli.bucket {
        config.agent.bucket.clone_from(bucket);
    }
    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.memory {
        config.storage.memory = true;
    }
    Ok(config)
}

fn open_storage(config: &AppConfig) -> Arc<dyn CacheStorage> {
    if config.storage.memory {
        log::info!("Using in-memory cache storage");
        Arc::new(MemoryStorage::new())
    } else {
        log::info!("Using cache storage at {}", config.storage.dir.display());
        Arc::new(DiskStorage::new(&config.storage.dir))
    }
}

async fn list(storage: &dyn CacheStorage, bucket: &str) -> precache::Result<()> {
    if !storage.has(bucket).await? {
        println!("Bucket '{bucket}' does not exist.");
        return Ok(());
    }
    let bucket = storage.open(bucket).await?;
    let keys = bucket.keys().await?;
    println!("Bucket '{}' holds {} entries:", bucket.name(), keys.len());
    for key in keys {
        println!("  {key}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> precache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args);
    let config = load_config(&cli)?;
    let storage = open_storage(&config);

    if cli.mode == Mode::List {
        return list(storage.as_ref(), &config.agent.bucket).await;
    }

    let installer = Installer::new(
        Manifest::default(),
        storage,
        Arc::new(HttpFetcher::new()?),
        config.agent.clone(),
    );
    let agent = Arc::new(Agent::new(installer));

    if cli.mode == Mode::Install {
        let report = agent.activate().await?;
        println!(
            "Installed {} assets ({} bytes) into bucket '{}'",
            report.entries, report.bytes, report.bucket
        );
        return Ok(());
    }

    // Requests arriving before installation finishes go straight to the origin.
    let activating = Arc::clone(&agent);
    tokio::spawn(async move {
        if let Err(e) = activating.activate().await {
            log::error!("Agent not activated, requests will pass through: {e}");
        }
    });

    precache::server::serve(agent, &config.server).await
}
