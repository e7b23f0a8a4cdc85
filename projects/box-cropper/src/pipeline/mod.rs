// Detection post-processing pipeline

pub mod crop;
pub mod detection;
pub mod display;
pub mod geometry;
pub mod labels;
pub mod orchestrator;
pub mod postprocess;
pub mod suppression;
pub mod types;
