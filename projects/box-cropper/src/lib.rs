//! Detect objects in images, videos or live streams and save every detection
//! as a padded crop, with its label and position, for downstream consumers
//! such as OCR.

pub mod pipeline;
pub mod run_artifacts;
pub mod run_context;
pub mod source;
pub mod video;

pub use pipeline::detection::{Detector, UslsDetector};
pub use pipeline::orchestrator::run;
pub use run_artifacts::{Position, ResultEntry};
pub use run_context::{BackendSettings, DetectOptions, Device, Precision};
