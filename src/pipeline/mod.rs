//! Deferred rendering pipeline
//!
//! A reference pipeline built entirely on the public graph API:
//! 1. IBL precompute - spreads environment convolution over several frames
//! 2. Geometry - draws the scene into the G-buffer on the worker pool
//! 3. Lighting - fullscreen pass computing lighting from the G-buffer
//! 4. Skybox - waits for the IBL precompute to finish
//! 5. Bloom - optional post-process, toggled at runtime
//! 6. Present - copies the HDR output to the backbuffer

pub mod deferred;

pub use deferred::{build_deferred_graph, Backbuffer, BloomSettings, DeferredPasses, DeferredPipeline};

/// Configuration for the deferred pipeline
#[derive(Debug, Clone)]
pub struct DeferredConfig {
    pub width: u32,
    pub height: u32,
    /// Maximum number of lights uploaded per frame
    pub max_lights: u32,
    /// Whether the bloom pass starts enabled
    pub enable_bloom: bool,
    /// Stages of the image-based lighting precompute, one per frame
    pub ibl_stages: Vec<String>,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_lights: 1024,
            enable_bloom: true,
            ibl_stages: ["irradiance", "prefilter", "brdf_lut"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
