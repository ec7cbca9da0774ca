//! Startup model loading.
//!
//! The model is loaded exactly once, before any frame is served. What happens on failure is
//! decided by `LoadFailurePolicy`: `Exit` surfaces the error to `main`, `Degrade` logs it and
//! leaves the handle unset so every frame gets the "model not loaded" diagnostic.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{BackendKind, LoadFailurePolicy, ModelSettings};
use crate::detect::backend::ModelHandle;
use crate::detect::backends::StubBackend;
use crate::detect::labels::ClassNames;

/// Build the configured backend, or fail.
pub fn load_backend(settings: &ModelSettings) -> Result<ModelHandle> {
    let names = match &settings.class_names_path {
        Some(path) => {
            let names = ClassNames::load(path)?;
            if names.is_empty() {
                log::warn!(
                    "class names file {} has no entries; labels fall back to class ids",
                    path.display()
                );
            }
            names
        }
        None => ClassNames::default(),
    };
    let backend: ModelHandle = match settings.backend {
        BackendKind::Stub => {
            log::warn!("using stub detector; boxes are fixed and do not reflect the frame");
            Arc::new(StubBackend::demo())
        }
        BackendKind::Tract => load_tract(settings, names)?,
    };
    backend
        .warm_up()
        .with_context(|| format!("{} backend warm-up failed", backend.name()))?;
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &ModelSettings, names: ClassNames) -> Result<ModelHandle> {
    use crate::detect::backends::TractYoloBackend;

    let backend = TractYoloBackend::load(&settings.path, settings.yolo_params(), names)?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(settings: &ModelSettings, _names: ClassNames) -> Result<ModelHandle> {
    Err(anyhow::anyhow!(
        "cannot load {}: the tract backend requires the backend-tract feature",
        settings.path.display()
    ))
}

/// Load the model under the configured failure policy.
///
/// Returns `Ok(None)` when loading failed and the policy is `Degrade`.
pub fn load_model(settings: &ModelSettings) -> Result<Option<ModelHandle>> {
    match load_backend(settings) {
        Ok(backend) => {
            log::info!(
                "model loaded from {} ({} backend)",
                settings.path.display(),
                backend.name()
            );
            Ok(Some(backend))
        }
        Err(err) => match settings.on_load_failure {
            LoadFailurePolicy::Exit => Err(err.context(format!(
                "failed to load model from {}",
                settings.path.display()
            ))),
            LoadFailurePolicy::Degrade => {
                log::error!(
                    "CRITICAL: failed to load model from {}: {:#}; serving diagnostic frames",
                    settings.path.display(),
                    err
                );
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(backend: BackendKind, policy: LoadFailurePolicy) -> ModelSettings {
        ModelSettings {
            path: PathBuf::from("/nonexistent/best.onnx"),
            backend,
            on_load_failure: policy,
            ..ModelSettings::default()
        }
    }

    #[test]
    fn stub_backend_always_loads() -> Result<()> {
        let handle = load_model(&settings(BackendKind::Stub, LoadFailurePolicy::Exit))?;
        assert_eq!(handle.map(|h| h.name()), Some("stub"));
        Ok(())
    }

    #[test]
    fn missing_model_degrades_or_fails_per_policy() {
        let degraded = load_model(&settings(BackendKind::Tract, LoadFailurePolicy::Degrade));
        assert!(matches!(degraded, Ok(None)));

        let fatal = load_model(&settings(BackendKind::Tract, LoadFailurePolicy::Exit));
        let err = fatal.err().expect("load must fail");
        assert!(format!("{:#}", err).contains("/nonexistent/best.onnx"));
    }

    #[test]
    fn missing_class_names_file_is_a_load_failure() {
        let mut cfg = settings(BackendKind::Stub, LoadFailurePolicy::Degrade);
        cfg.class_names_path = Some(PathBuf::from("/nonexistent/names.txt"));
        assert!(matches!(load_model(&cfg), Ok(None)));
    }
}
