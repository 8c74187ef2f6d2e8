//! Shared data models for the mosaic generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Processing configuration (canvas, density, formats, policies)
//! - Density tokens and duration buckets
//! - Mosaic layout planning
//! - Progress event schemas consumed by pipeline subscribers

pub mod bucket;
pub mod config;
pub mod density;
pub mod layout;
pub mod progress;

pub use bucket::DurationBucket;
pub use config::{
    CanvasAspect, ConfigError, GeneratorConfig, JobKind, OutputFormat, ProcessingConfig,
};
pub use density::Density;
pub use layout::{
    plan_layout, thumbnail_count, MosaicLayout, MAX_THUMBNAIL_COUNT, MIN_THUMBNAIL_COUNT,
};
pub use progress::{FileProgress, FileStage, GlobalProgress, ProgressEvent};
