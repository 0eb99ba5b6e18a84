mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, ExportTarget};
use ms_av::{ExportHints, ExtractionEngine, FileSource, MediaSource};
use ms_batch::{BatchCoordinator, ItemState};
use ms_core::config::Config;
use ms_core::{StreamDetails, StreamKind, VideoMetadata};
use ms_deliver::{ArtifactDownloader, FsSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediascope=trace,ms_av=trace,ms_batch=trace,ms_parser=debug".to_string()
        } else {
            "mediascope=info,ms_av=info,ms_batch=info".to_string()
        }
    });
    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Probe { files, json } => probe_files(&files, cli.config.as_deref(), json).await,
        Commands::Export { target } => export(target, cli.config.as_deref()).await,
        Commands::Backends => check_backends(cli.config.as_deref()).await,
        Commands::Validate {
            config: config_path,
        } => validate_config(config_path.or(cli.config).as_deref()),
        Commands::Version => {
            println!("mediascope {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn setup(config_path: Option<&Path>) -> Result<(Config, Arc<ExtractionEngine>)> {
    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }
    let engine = ExtractionEngine::new(&config).context("failed to set up extraction engine")?;
    Ok((config, Arc::new(engine)))
}

async fn probe_files(files: &[PathBuf], config_path: Option<&Path>, json: bool) -> Result<()> {
    let (config, engine) = setup(config_path)?;
    engine.load().await.context("backend initialization failed")?;

    let coordinator = BatchCoordinator::new(engine, config.batch.clone());

    let mut sources: Vec<Arc<dyn MediaSource>> = Vec::with_capacity(files.len());
    for file in files {
        let source = FileSource::open(file)
            .await
            .with_context(|| format!("cannot open {}", file.display()))?;
        sources.push(Arc::new(source));
    }
    coordinator.select_files(sources);

    // Echo aggregate progress while the batch runs.
    let mut rx = coordinator.subscribe();
    let progress = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow().clone();
            if snapshot.progress.visible {
                tracing::info!(
                    "[{:.0}%] {}",
                    snapshot.progress.percent,
                    snapshot.progress.label
                );
            }
        }
    });

    coordinator.process_pending().await;
    progress.abort();

    let snapshot = coordinator.snapshot();
    let mut failures = 0usize;
    for item in &snapshot.items {
        match (&item.state, &item.metadata) {
            (ItemState::Completed, Some(metadata)) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(metadata)?);
                } else {
                    print_metadata(metadata, item.method.as_deref());
                }
            }
            _ => {
                failures += 1;
                let message = item.error.as_deref().unwrap_or("unknown failure");
                eprintln!("{}: {message}", item.file_name);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} files failed", snapshot.items.len());
    }
    Ok(())
}

fn print_metadata(metadata: &VideoMetadata, method: Option<&str>) {
    let format = &metadata.format;
    println!(
        "{} ({}, {} bytes{})",
        format.filename,
        format.container,
        format.size_bytes,
        method.map(|m| format!(", via {m}")).unwrap_or_default()
    );
    println!(
        "  duration {} s ({} ms), {} frames @ {} fps, bitrate {} b/s",
        format.display_duration(),
        format.display_duration_ms(),
        format.display_frame_count(),
        format.display_frame_rate(),
        format.display_bit_rate()
    );
    for stream in &metadata.streams {
        match &stream.details {
            StreamDetails::Video(v) => println!(
                "  #{} video    {}{} {} {}",
                stream.index,
                stream.codec,
                stream
                    .profile
                    .as_deref()
                    .map(|p| format!(" ({p})"))
                    .unwrap_or_default(),
                v.display_resolution(),
                v.pixel_format.as_deref().unwrap_or(ms_core::UNKNOWN),
            ),
            StreamDetails::Audio(a) => println!(
                "  #{} audio    {} {} Hz {}",
                stream.index,
                stream.codec,
                a.display_sample_rate(),
                a.display_channel_layout(),
            ),
            StreamDetails::Subtitle(s) => println!(
                "  #{} subtitle {} lang={}{}{}",
                stream.index,
                stream.codec,
                s.display_language(),
                if s.default { " default" } else { "" },
                if s.forced { " forced" } else { "" },
            ),
        }
    }
}

async fn export(target: ExportTarget, config_path: Option<&Path>) -> Result<()> {
    let (config, engine) = setup(config_path)?;
    engine.load().await.context("backend initialization failed")?;

    let coordinator = BatchCoordinator::new(engine, config.batch.clone());

    let (file, output_dir, artifact) = match target {
        ExportTarget::Subtitle {
            file,
            stream,
            language,
            codec,
            forced,
            output_dir,
        } => {
            let id = coordinator.select_file(open_source(&file).await?);
            let hints = ExportHints {
                language,
                codec,
                forced,
            };
            let artifact = coordinator.export_subtitle(id, stream, &hints).await?;
            (file, output_dir, artifact)
        }
        ExportTarget::Video {
            file,
            stream,
            codec,
            output_dir,
        } => {
            let id = coordinator.select_file(open_source(&file).await?);
            let artifact = coordinator
                .export_stream(id, stream, StreamKind::Video, codec.as_deref())
                .await?;
            (file, output_dir, artifact)
        }
        ExportTarget::Audio {
            file,
            stream,
            codec,
            output_dir,
        } => {
            let id = coordinator.select_file(open_source(&file).await?);
            let artifact = coordinator
                .export_stream(id, stream, StreamKind::Audio, codec.as_deref())
                .await?;
            (file, output_dir, artifact)
        }
    };

    let downloader = ArtifactDownloader::new(config.delivery.clone())
        .with_progress(|fraction| tracing::info!("delivering: {:.0}%", fraction * 100.0));
    let mut sink = FsSink::new(&output_dir);
    downloader.deliver(artifact, &mut sink).await?;

    match sink.last_path() {
        Some(path) => println!("{} -> {}", file.display(), path.display()),
        None => println!("{} -> {}", file.display(), output_dir.display()),
    }
    Ok(())
}

async fn open_source(path: &Path) -> Result<Arc<dyn MediaSource>> {
    let source = FileSource::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    Ok(Arc::new(source))
}

async fn check_backends(config_path: Option<&Path>) -> Result<()> {
    let (_, engine) = setup(config_path)?;
    let mut all_available = true;
    for status in engine.availability().await {
        if status.available {
            println!(
                "{:<10} available  {}",
                status.name,
                status.version.as_deref().unwrap_or("")
            );
        } else {
            all_available = false;
            println!(
                "{:<10} MISSING    {}",
                status.name,
                status.detail.as_deref().unwrap_or("")
            );
        }
    }
    if !all_available {
        anyhow::bail!("one or more backends are unavailable");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(path);
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("configuration is valid");
    } else {
        for warning in &warnings {
            println!("warning: {warning}");
        }
    }
    Ok(())
}
