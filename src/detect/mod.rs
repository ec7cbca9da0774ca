mod backend;
pub mod backends;
mod labels;
pub mod load;
mod result;
pub mod yolo;

pub use backend::{DetectorBackend, ModelHandle};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractYoloBackend;
pub use labels::ClassNames;
pub use load::{load_backend, load_model};
pub use result::{Detection, DetectionResult};
pub use yolo::{Letterbox, YoloParams};
