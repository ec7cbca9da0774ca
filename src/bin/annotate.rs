//! annotate - run the frame processor over still images
//!
//! Reads one image or every JPEG/PNG in a directory, annotates each with the same processor
//! the live server uses, and writes the results to an output directory.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use webcam_detect::config::{BackendKind, LoadFailurePolicy};
use webcam_detect::ingest::file::list_images;
use webcam_detect::ui;
use webcam_detect::{load_model, AppConfig, ConfidenceThreshold, Frame, FrameProcessor, MirrorMode};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file or directory of images.
    input: PathBuf,
    /// Output directory for annotated images.
    #[arg(long, default_value = "annotated_out")]
    out: PathBuf,
    /// Model file (overrides DETECT_MODEL_PATH / config).
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Detector backend: tract or stub.
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,
    /// Class names file, one label per line.
    #[arg(long, value_name = "PATH")]
    class_names: Option<PathBuf>,
    /// Confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,
    /// Mirror mode: off, before_inference or display_only.
    #[arg(long, value_name = "MODE")]
    mirror: Option<String>,
    /// Fail instead of writing diagnostic frames when the model fails to load.
    #[arg(long)]
    require_model: bool,
    /// UI mode: auto, plain, pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut cfg = AppConfig::load()?;
    if let Some(path) = &args.model {
        cfg.model.path = path.clone();
    }
    if let Some(name) = &args.backend {
        cfg.model.backend = BackendKind::parse(name)
            .with_context(|| format!("unknown model backend '{}'", name))?;
    }
    if let Some(path) = &args.class_names {
        cfg.model.class_names_path = Some(path.clone());
    }
    if let Some(mode) = &args.mirror {
        cfg.processing.mirror = MirrorMode::parse(mode)
            .with_context(|| format!("unknown mirror mode '{}'", mode))?;
    }
    if let Some(value) = args.confidence {
        cfg.processing.confidence = ConfidenceThreshold::new(value);
    }
    if args.require_model {
        cfg.model.on_load_failure = LoadFailurePolicy::Exit;
    }
    cfg.validate()?;
    let threshold = cfg.processing.confidence;

    let inputs = list_images(&args.input)?;
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let processor =
        FrameProcessor::from_slot(load_model(&cfg.model)?).with_mirror(cfg.processing.mirror);

    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty);
    let mut progress = ui.batch(inputs.len() as u64);
    for input in &inputs {
        let name = file_name(input)?;
        let frame = Frame::open(input)?;
        let processed = processor.process_report(frame, threshold);
        processed.frame.save(args.out.join(&name))?;
        progress.image_done(&name, processed.detections.len(), processed.diagnostic.is_some());
    }
    let degraded = progress.degraded();
    progress.finish();

    if degraded > 0 && !processor.is_model_loaded() {
        log::warn!("model not loaded: {} diagnostic image(s) written", degraded);
    }
    println!("annotated images written to {}", args.out.display());
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("invalid image file name {}", path.display()))
}
