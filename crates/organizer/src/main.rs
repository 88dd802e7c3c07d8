mod config;

use std::process::ExitCode;

use config::{config_path_from_env, load_or_create_config, resolve_path};
use metadata::ExifTool;
use pipeline::albums::AlbumStore;
use pipeline::{Organizer, RunOptions};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!(
            "Created default config at {}; set input_root and output_root, then re-run",
            config_path.display()
        );
        return Ok(());
    }
    info!("Loaded config from {}", config_path.display());

    if config.input_root.trim().is_empty() {
        return Err("input_root is not set in the config".into());
    }
    if config.output_root.trim().is_empty() {
        return Err("output_root is not set in the config".into());
    }

    let exiftool = ExifTool::new(&config.exiftool);
    match exiftool.version().await {
        Ok(version) => info!("Found exiftool {}", version),
        Err(err) => {
            return Err(format!(
                "exiftool is not usable ({}); install it or point `exiftool` in the config at it",
                err
            )
            .into());
        }
    }

    let albums = if config.albums_file.trim().is_empty() {
        None
    } else {
        let names_file = resolve_path(&config_path, &config.albums_file);
        let albums_dir = resolve_path(&config_path, &config.albums_dir);
        Some(AlbumStore::open(albums_dir, &names_file).await?)
    };

    let options = RunOptions {
        input_root: resolve_path(&config_path, &config.input_root),
        output_root: resolve_path(&config_path, &config.output_root),
        layout: config.layout,
        workers: config.workers,
        logs_dir: resolve_path(&config_path, &config.logs_dir),
    };

    let organizer = Organizer::new(exiftool, options, albums);
    let cancel = organizer.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received; finishing files already in flight");
        cancel.cancel();
    });

    let summary = organizer.run().await?;
    if summary.cancelled {
        warn!("Run was cancelled before all files were processed");
    }

    println!(
        "Processed {} files, relocated {}, recorded {} album items",
        summary.discovered, summary.relocated, summary.album_items
    );
    println!("Metadata errors:   {}", summary.logs.metadata.display());
    println!("Relocation errors: {}", summary.logs.relocation.display());
    println!("Duplicate renames: {}", summary.logs.duplicates.display());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }
}
