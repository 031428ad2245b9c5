//! Filter chain between raw capture and LLM ingestion (spec §4.4-§4.6):
//! per-image dedup/content-gate/compression, record merging, and the
//! interval-bounded subsample handed to the extraction agents.

pub mod image_filter;
pub mod image_sampler;
pub mod record_filter;

pub use image_filter::{FilterCounters, ImageFilter, ImageFilterConfig, Scene};
pub use image_sampler::ImageSampler;
pub use record_filter::{RecordFilter, RecordFilterConfig};
