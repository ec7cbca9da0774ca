//! detect_server - live webcam object detection demo
//!
//! This daemon:
//! 1. Loads the detection model once (or degrades to diagnostic frames)
//! 2. Runs one worker thread per stream: capture, detect, annotate, encode
//! 3. Serves the browser page, the MJPEG stream and the threshold slider

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use webcam_detect::{
    api::{ApiConfig, ApiServer},
    config::{BackendKind, LoadFailurePolicy},
    load_model, open_source, AppConfig, ConfidenceThreshold, FrameProcessor, MirrorMode,
    SharedThreshold, StreamShared, StreamWorker,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Model file (overrides DETECT_MODEL_PATH / config).
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Detector backend: tract or stub.
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,
    /// Class names file, one label per line.
    #[arg(long, value_name = "PATH")]
    class_names: Option<PathBuf>,
    /// Frame source: stub://name, /dev/videoN, v4l2://..., an image or a directory.
    #[arg(long, value_name = "URI")]
    source: Option<String>,
    /// Initial confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,
    /// Mirror mode: off, before_inference or display_only.
    #[arg(long, value_name = "MODE")]
    mirror: Option<String>,
    /// HTTP listen address.
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
    /// Exit instead of serving diagnostic frames when the model fails to load.
    #[arg(long)]
    require_model: bool,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) -> Result<()> {
        if let Some(path) = &self.model {
            cfg.model.path = path.clone();
        }
        if let Some(name) = &self.backend {
            cfg.model.backend = BackendKind::parse(name)
                .with_context(|| format!("unknown model backend '{}'", name))?;
        }
        if let Some(path) = &self.class_names {
            cfg.model.class_names_path = Some(path.clone());
        }
        if let Some(uri) = &self.source {
            cfg.source.uri = uri.clone();
        }
        if let Some(value) = self.confidence {
            cfg.processing.confidence = ConfidenceThreshold::new(value);
        }
        if let Some(mode) = &self.mirror {
            cfg.processing.mirror = MirrorMode::parse(mode)
                .with_context(|| format!("unknown mirror mode '{}'", mode))?;
        }
        if let Some(addr) = &self.addr {
            cfg.api_addr = addr.clone();
        }
        if self.require_model {
            cfg.model.on_load_failure = LoadFailurePolicy::Exit;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AppConfig::load()?;
    args.apply(&mut cfg)?;
    cfg.validate()?;

    let model = load_model(&cfg.model)?;
    let processor = FrameProcessor::from_slot(model).with_mirror(cfg.processing.mirror);
    let threshold = SharedThreshold::new(cfg.processing.confidence);
    let shared = StreamShared::new(processor, threshold);

    let source = open_source(&cfg.source)?;
    let worker = StreamWorker::new(source, shared.clone(), cfg.source.target_fps)
        .spawn()
        .with_context(|| format!("failed to start stream from {}", cfg.source.uri))?;

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        shared.clone(),
    )
    .spawn()
    .with_context(|| format!("failed to bind {}", cfg.api_addr))?;
    log::info!(
        "detect_server listening on http://{} (source {}, threshold {}, mirror {:?})",
        api_handle.addr,
        cfg.source.uri,
        shared.threshold.get().value(),
        cfg.processing.mirror
    );
    if !shared.processor.is_model_loaded() {
        log::warn!("serving diagnostic frames: model not loaded");
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("detect_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping stream and API server...");
    worker.stop()?;
    api_handle.stop()?;
    log::info!(
        "processed {} frame(s), {} degraded, {} source error(s)",
        shared.stats.frames_processed(),
        shared.stats.frames_degraded(),
        shared.stats.source_errors()
    );

    Ok(())
}
