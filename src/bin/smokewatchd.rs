//! smokewatchd - smoke detection daemon
//!
//! This daemon:
//! 1. Loads configuration (.env, optional JSON file, environment)
//! 2. Opens the configured camera (local device, ESP32-CAM style HTTP, or stub)
//! 3. Runs the detector on every frame and debounces the result
//! 4. Hands alerts to a background dispatcher (Telegram, or the log on dry runs)
//! 5. Stops on Ctrl-C / SIGTERM, a fatal source error, or `--max-frames`

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;

use smokewatch::alert::DEFAULT_QUEUE_CAPACITY;
use smokewatch::ingest::BackoffPolicy;
use smokewatch::{
    open_source, AlertDispatcher, Debouncer, DetectionAdapter, DetectorBackend, DispatchWorker,
    LoggingSink, NotificationSink, Pipeline, PipelineSettings, ScriptedBackend, SmokewatchConfig,
    SourceSettings, StopSignal, TelegramConfig, TelegramSink,
};

/// Exit code for errors raised before the run loop starts.
const EXIT_STARTUP_ERROR: i32 = 1;
/// Exit code when the camera cannot be opened (same as a fatal source error).
const EXIT_SOURCE_FAILED: i32 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (same as SMOKEWATCH_CONFIG).
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
    /// Camera source: device index, /dev/videoN, http(s) URL, or stub://name.
    #[arg(long, value_name = "SOURCE")]
    camera: Option<String>,
    /// Stop after this many processed frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,
    /// Use the scripted detector and log alerts instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("SMOKEWATCH_CONFIG", path);
    }
    if let Some(camera) = &args.camera {
        std::env::set_var("CAMERA_SOURCE", camera);
    }

    init_logging(SmokewatchConfig::resolve_log_file().as_deref());

    match run(&args) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(EXIT_STARTUP_ERROR);
        }
    }
}

fn run(args: &Args) -> Result<i32> {
    let cfg = if args.dry_run {
        SmokewatchConfig::load_for_dry_run()
    } else {
        SmokewatchConfig::load()
    }
    .context("configuration error")?;

    log::info!(
        "smokewatchd {} starting{}",
        env!("CARGO_PKG_VERSION"),
        if args.dry_run { " (dry run)" } else { "" }
    );

    let mut adapter = DetectionAdapter::new(
        build_backend(&cfg, args.dry_run)?,
        cfg.detection.threshold(),
    );
    adapter.warm_up().context("detector warm-up failed")?;

    let source_settings = SourceSettings {
        camera: cfg.camera_spec()?,
        fetch_timeout: cfg.camera.fetch_timeout,
        width: cfg.camera.width,
        height: cfg.camera.height,
    };
    let source = match open_source(&source_settings) {
        Ok(source) => source,
        Err(err) => {
            log::error!("camera {}: {}", source_settings.camera, err);
            return Ok(EXIT_SOURCE_FAILED);
        }
    };

    let (sink, destination): (Box<dyn NotificationSink>, String) = if args.dry_run {
        (Box::new(LoggingSink), "dry-run".to_string())
    } else {
        let sink = TelegramSink::new(TelegramConfig {
            bot_token: cfg.telegram.bot_token.clone(),
            api_base: cfg.telegram.api_base.clone(),
            timeout: cfg.telegram.timeout,
        })?;
        (Box::new(sink), cfg.telegram.chat_id.clone())
    };
    let dispatcher = AlertDispatcher::new(sink, destination, cfg.snapshot_path.clone());
    let worker = DispatchWorker::spawn(dispatcher, DEFAULT_QUEUE_CAPACITY)?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        handler_stop.trigger();
    })
    .context("install shutdown signal handler")?;

    let debouncer = Debouncer::new(cfg.detection.debounce());
    let settings = PipelineSettings {
        frame_delay: cfg.camera.frame_delay,
        backoff: BackoffPolicy::fixed(cfg.camera.retry_delay),
        max_frames: args.max_frames,
        ..PipelineSettings::default()
    };

    let summary = Pipeline::new(source, adapter, debouncer, worker, settings, stop).run();
    Ok(summary.exit.exit_code())
}

fn build_backend(cfg: &SmokewatchConfig, dry_run: bool) -> Result<Box<dyn DetectorBackend>> {
    if dry_run {
        return Ok(Box::new(ScriptedBackend::dry_run()));
    }
    model_backend(cfg)
}

#[cfg(feature = "backend-tract")]
fn model_backend(cfg: &SmokewatchConfig) -> Result<Box<dyn DetectorBackend>> {
    let backend = smokewatch::TractBackend::new(
        &cfg.model.path,
        cfg.model.input_size,
        cfg.model.use_gpu,
    )
    .with_context(|| format!("load model {}", cfg.model.path.display()))?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn model_backend(cfg: &SmokewatchConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow::anyhow!(
        "model {} needs the backend-tract feature (or run with --dry-run)",
        cfg.model.path.display()
    ))
}

/// Log to stderr, or append to `log_file` when one is configured. If the file
/// cannot be opened the daemon keeps logging to stderr.
fn init_logging(log_file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    let open_error = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
                None
            }
            Err(err) => Some(format!(
                "failed to open log file {}: {}; logging to stderr",
                path.display(),
                err
            )),
        },
        None => None,
    };
    builder.init();
    if let Some(message) = open_error {
        log::error!("{}", message);
    }
}
