use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::YoloParams;
use crate::frame::{ConfidenceThreshold, DEFAULT_CONFIDENCE};
use crate::processor::MirrorMode;

const DEFAULT_MODEL_PATH: &str = "./best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 100;
const DEFAULT_SOURCE_URI: &str = "stub://webcam";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_API_ADDR: &str = "127.0.0.1:7860";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Tract,
    Stub,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Some(BackendKind::Tract),
            "stub" => Some(BackendKind::Stub),
            _ => None,
        }
    }
}

/// What to do when the model cannot be loaded at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadFailurePolicy {
    /// Keep running; every frame gets the "model not loaded" diagnostic.
    #[default]
    Degrade,
    /// Abort startup with a non-zero exit.
    Exit,
}

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    model: Option<ModelConfigFile>,
    source: Option<SourceConfigFile>,
    processing: Option<ProcessingConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<String>,
    class_names: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    required: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessingConfigFile {
    confidence: Option<f32>,
    mirror: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelSettings,
    pub source: SourceSettings,
    pub processing: ProcessingSettings,
    pub api_addr: String,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub backend: BackendKind,
    pub class_names_path: Option<PathBuf>,
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub on_load_failure: LoadFailurePolicy,
}

impl ModelSettings {
    pub fn yolo_params(&self) -> YoloParams {
        YoloParams {
            input_size: self.input_size,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            backend: BackendKind::default(),
            class_names_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            on_load_failure: LoadFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            target_fps: DEFAULT_SOURCE_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingSettings {
    /// Initial slider value.
    pub confidence: ConfidenceThreshold,
    pub mirror: MirrorMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            source: SourceSettings::default(),
            processing: ProcessingSettings::default(),
            api_addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `DETECT_CONFIG`, then `DETECT_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = AppConfig::default();
        let model_file = file.model.unwrap_or_default();
        let backend = match model_file.backend.as_deref() {
            Some(name) => parse_backend(name)?,
            None => defaults.model.backend,
        };
        let model = ModelSettings {
            path: model_file.path.unwrap_or(defaults.model.path),
            backend,
            class_names_path: model_file.class_names,
            input_size: model_file.input_size.unwrap_or(defaults.model.input_size),
            iou_threshold: model_file
                .iou_threshold
                .unwrap_or(defaults.model.iou_threshold),
            max_detections: model_file
                .max_detections
                .unwrap_or(defaults.model.max_detections),
            on_load_failure: policy_from_required(model_file.required.unwrap_or(false)),
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            uri: source_file.uri.unwrap_or(defaults.source.uri),
            target_fps: source_file
                .target_fps
                .unwrap_or(defaults.source.target_fps),
            width: source_file.width.unwrap_or(defaults.source.width),
            height: source_file.height.unwrap_or(defaults.source.height),
        };

        let processing_file = file.processing.unwrap_or_default();
        let mirror = match processing_file.mirror.as_deref() {
            Some(value) => parse_mirror(value)?,
            None => MirrorMode::default(),
        };
        let processing = ProcessingSettings {
            confidence: ConfidenceThreshold::new(
                processing_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            ),
            mirror,
        };

        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or(defaults.api_addr);

        Ok(Self {
            model,
            source,
            processing,
            api_addr,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("DETECT_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = env_nonempty("DETECT_BACKEND") {
            self.model.backend = parse_backend(&backend)?;
        }
        if let Some(path) = env_nonempty("DETECT_CLASS_NAMES") {
            self.model.class_names_path = Some(PathBuf::from(path));
        }
        if let Some(required) = env_nonempty("DETECT_REQUIRE_MODEL") {
            let required = parse_bool(&required)
                .ok_or_else(|| anyhow!("DETECT_REQUIRE_MODEL must be true or false"))?;
            self.model.on_load_failure = policy_from_required(required);
        }
        if let Some(uri) = env_nonempty("DETECT_SOURCE") {
            self.source.uri = uri;
        }
        if let Some(confidence) = env_nonempty("DETECT_CONFIDENCE") {
            let value: f32 = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECT_CONFIDENCE must be a number"))?;
            self.processing.confidence = ConfidenceThreshold::new(value);
        }
        if let Some(mirror) = env_nonempty("DETECT_MIRROR") {
            self.processing.mirror = parse_mirror(&mirror)?;
        }
        if let Some(addr) = env_nonempty("DETECT_API_ADDR") {
            self.api_addr = addr;
        }
        Ok(())
    }

    /// Re-run after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(anyhow!(
                "model input_size must be a positive multiple of 32, got {}",
                self.model.input_size
            ));
        }
        if !(0.0..=1.0).contains(&self.model.iou_threshold) {
            return Err(anyhow!("model iou_threshold must be within 0..=1"));
        }
        if self.model.max_detections == 0 {
            return Err(anyhow!("model max_detections must be greater than zero"));
        }
        if !self.processing.confidence.value().is_finite() {
            return Err(anyhow!("confidence must be a finite number"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_backend(value: &str) -> Result<BackendKind> {
    BackendKind::parse(value).ok_or_else(|| anyhow!("unknown model backend '{}'", value))
}

fn parse_mirror(value: &str) -> Result<MirrorMode> {
    MirrorMode::parse(value).ok_or_else(|| {
        anyhow!(
            "unknown mirror mode '{}' (expected off, before_inference or display_only)",
            value
        )
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn policy_from_required(required: bool) -> LoadFailurePolicy {
    if required {
        LoadFailurePolicy::Exit
    } else {
        LoadFailurePolicy::Degrade
    }
}
