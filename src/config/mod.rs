//! Configuration and serialization module.

mod params;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compositor::TieBreak;

pub use params::{ParamsError, SubjectParams};

/// Focal length used when a parameter record does not carry one.
pub const DEFAULT_FOCAL_LENGTH: f32 = 5000.0;

/// Settings for one overlay batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Fitting output folder containing `meshes/` and `results/`.
    pub data_dir: PathBuf,
    /// Folder with the source photographs.
    pub images_dir: PathBuf,
    /// Where composited images are written.
    pub output_dir: PathBuf,
    /// Camera focal length in pixels.
    pub focal_length: f32,
    /// Copy images without any subject to the output folder unchanged.
    pub copy_empty: bool,
    /// Write results to disk.
    pub save: bool,
    /// Also write one composite per subject.
    pub save_per_subject: bool,
    /// Resolve overlaps between subjects by depth.
    pub use_depth: bool,
    /// Policy for exact depth ties.
    pub tie_break: TieBreak,
    /// What to do when a subject fails to load or render.
    pub on_subject_error: SubjectFailurePolicy,
    /// Accepted image file extensions, lowercase, without the dot.
    pub image_extensions: Vec<String>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            images_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("output"),
            focal_length: DEFAULT_FOCAL_LENGTH,
            copy_empty: false,
            save: true,
            save_per_subject: false,
            use_depth: true,
            tie_break: TieBreak::default(),
            on_subject_error: SubjectFailurePolicy::default(),
            image_extensions: vec!["png".to_string(), "jpg".to_string()],
        }
    }
}

impl OverlayConfig {
    /// Folder holding one mesh folder per image.
    pub fn mesh_root(&self) -> PathBuf {
        self.data_dir.join("meshes")
    }

    /// Folder holding one parameter folder per image.
    pub fn results_root(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    /// Whether `path` has one of the accepted image extensions.
    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.image_extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Handling of a subject whose mesh or render fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectFailurePolicy {
    /// Give up on the whole image.
    AbortImage,
    /// Leave the subject out and keep compositing the rest.
    SkipSubject,
}

impl Default for SubjectFailurePolicy {
    fn default() -> Self {
        SubjectFailurePolicy::AbortImage
    }
}

/// Load a run configuration from JSON.
pub fn load_config(path: &Path) -> std::io::Result<OverlayConfig> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Save a run configuration as pretty-printed JSON.
pub fn save_config(config: &OverlayConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, json)
}
