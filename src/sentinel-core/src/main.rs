//! Sentinel - motion detection CLI
//!
//! Watches a camera, stream, file or image directory and uploads a snapshot
//! whenever something moves.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use sentinel_capture::{open_source, ConsoleDisplay, Display};
use sentinel_core::colored_logger::{init_logging, LogOptions};
use sentinel_core::config::{self, Config, Overrides, DEFAULT_CONFIG_FILE};
use sentinel_core::daemon;
use sentinel_core::detector::Detector;
use sentinel_core::dispatcher::{EventDispatcher, NotifyTarget};
use sentinel_core::lifecycle::Lifecycle;
use sentinel_core::snapshot::SnapshotStore;
use sentinel_delivery::{Delivery, MqttNotifier, Notifier, WorkerPool};
use sentinel_processing::MotionAnalyzer;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Motion detection with snapshot upload and MQTT notification")]
#[command(version)]
struct Cli {
    /// Video source: camera index, video file, image directory or stream URL
    input: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detach and run in the background (implies --headless)
    #[arg(long)]
    daemon: bool,

    /// Disable the display and hotkeys
    #[arg(long)]
    headless: bool,

    /// Pidfile written in daemon mode
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Directory for snapshots
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Check dependencies and configuration, then exit
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let overrides = Overrides {
        input: cli.input.clone(),
        headless: cli.headless,
        daemon: cli.daemon,
        pid_file: cli.pid_file.clone(),
        output_dir: cli.output_dir.clone(),
    };

    let loaded = config::load(&config_path, &overrides)?;
    let mut config = loaded.config;

    if cli.check {
        return cmd_check(&config_path, &config, loaded.fallback.as_ref());
    }

    let _pid_guard = if cli.daemon {
        let cwd = std::env::current_dir().context("failed to resolve working directory")?;
        config.absolutize(&cwd);
        Some(daemon::detach(&config)?)
    } else {
        None
    };

    init_logging(LogOptions {
        verbose: cli.verbose,
        console: !cli.daemon,
        log_file: Some(&config.log_file),
    })?;

    if let Some(e) = &loaded.fallback {
        warn!("{}, using built-in defaults", e);
    }

    cmd_detect(config)
}

fn cmd_detect(config: Config) -> Result<()> {
    info!("starting sentinel {}", env!("CARGO_PKG_VERSION"));
    info!("input: {}", config.input);
    info!("output directory: {:?}", config.output_dir);
    info!(
        "min area: {}, threshold: {}, roi: {}",
        config.min_area,
        config.threshold,
        config
            .roi
            .map(|r| r.to_string())
            .unwrap_or_else(|| "full frame".to_string())
    );

    let lifecycle = Lifecycle::new();
    lifecycle
        .install_signal_handler()
        .context("failed to install signal handler")?;

    let source = open_source(&config.input)
        .with_context(|| format!("could not open video source {:?}", config.input))?;

    let display: Option<Box<dyn Display>> = if config.headless {
        None
    } else {
        info!("hotkeys: q quit, s snapshot, r reset reference (type and press enter)");
        Some(Box::new(ConsoleDisplay::new(config.preview_path.clone())))
    };

    let delivery: Arc<dyn Delivery> = config.delivery.build();
    info!("delivery: {}", delivery.describe());

    let notify = match &config.notification {
        Some(n) => {
            let notifier = MqttNotifier::new(&n.broker)?;
            info!("notifications: {} topic {}", notifier.describe(), n.topic);
            Some(NotifyTarget {
                notifier: Arc::new(notifier),
                topic: n.topic.clone(),
            })
        }
        None => None,
    };

    let store = SnapshotStore::new(&config.output_dir)
        .with_context(|| format!("failed to create output directory {:?}", config.output_dir))?;
    let pool = WorkerPool::new(config.pool()).context("failed to start delivery workers")?;
    let dispatcher = EventDispatcher::new(store, pool, delivery, notify);

    let mut detector = Detector::new(
        source,
        display,
        MotionAnalyzer::new(config.analyzer()),
        dispatcher,
        lifecycle,
    );

    let result = detector.run();
    let report = detector.finish(Duration::from_secs(config.shutdown_grace_secs));
    if report.still_busy > 0 {
        warn!("exiting with {} delivery job(s) still running", report.still_busy);
    }

    let stats = result?;
    info!(
        "sentinel stopped: {} frames, {} motion events, {} snapshots",
        stats.frames, stats.events, stats.snapshots
    );
    Ok(())
}

fn cmd_check(config_path: &std::path::Path, config: &Config, fallback: Option<&config::ConfigError>) -> Result<()> {
    println!("checking dependencies...\n");

    let ffmpeg_ok = sentinel_capture::check_ffmpeg();
    println!("  ffmpeg:  {}", if ffmpeg_ok { "OK" } else { "NOT FOUND" });

    match fallback {
        None => println!("  config:  {:?} OK", config_path),
        Some(e) => println!("  config:  {} (using defaults)", e),
    }
    println!("  input:   {}", config.input);
    println!("  output:  {:?}", config.output_dir);
    println!("  upload:  {}", config.delivery.build());
    match &config.notification {
        Some(n) => println!("  mqtt:    {} topic {}", n.broker, n.topic),
        None => println!("  mqtt:    disabled"),
    }

    println!();

    if !ffmpeg_ok {
        println!("WARNING: FFmpeg is required for cameras, video files and streams.");
        println!("Image directories work without it.");
    } else {
        println!("all checks passed!");
    }

    Ok(())
}
