//! Mesh Overlay
//!
//! Draws fitted 3D body meshes over the photographs they were fitted to:
//! - Per-subject rendering of a mesh into an RGBA layer and a depth buffer
//! - Depth-aware compositing of all layers over the source image
//! - Batch processing of a fitting output folder

pub mod compositor;
pub mod config;
pub mod export;
pub mod mesh;
pub mod pipeline;
pub mod render;

pub use compositor::{composite, Batch, CompositeError, Compositor, DepthMap};
pub use pipeline::{BatchReport, OverlayPipeline};
pub use render::{render_subject, RenderEngine, SoftwareRasterizer};
