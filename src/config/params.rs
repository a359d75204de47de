//! Per-subject camera parameters written by the fitting stage.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading a parameter record.
#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse parameter file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid parameter record: {0}")]
    Invalid(String),
}

/// Camera placement for one fitted subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectParams {
    /// Principal point in pixels.
    pub camera_center: [f32; 2],
    /// Camera translation in mesh units.
    pub camera_translation: [f32; 3],
    /// Overrides the run's focal length when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f32>,
}

/// On-disk form; the fitting stage may write vectors with a leading batch axis.
#[derive(Deserialize)]
struct RawParams {
    camera_center: serde_json::Value,
    camera_translation: serde_json::Value,
    #[serde(default)]
    focal_length: Option<f32>,
}

impl SubjectParams {
    /// Read a JSON parameter record.
    pub fn load(path: &Path) -> Result<Self, ParamsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ParamsError> {
        let raw: RawParams = serde_json::from_str(contents)?;
        let center = squeeze(&raw.camera_center, "camera_center")?;
        let translation = squeeze(&raw.camera_translation, "camera_translation")?;

        let camera_center: [f32; 2] = center.try_into().map_err(|v: Vec<f32>| {
            ParamsError::Invalid(format!("camera_center has {} values, expected 2", v.len()))
        })?;
        let camera_translation: [f32; 3] = translation.try_into().map_err(|v: Vec<f32>| {
            ParamsError::Invalid(format!("camera_translation has {} values, expected 3", v.len()))
        })?;

        Ok(Self {
            camera_center,
            camera_translation,
            focal_length: raw.focal_length,
        })
    }
}

/// Flatten `[a, b]`, `[[a, b]]`, `[[[a, b]]]`... into `[a, b]`.
fn squeeze(value: &serde_json::Value, field: &str) -> Result<Vec<f32>, ParamsError> {
    let mut current = value;
    loop {
        let items = current
            .as_array()
            .ok_or_else(|| ParamsError::Invalid(format!("{} is not an array", field)))?;
        match items.as_slice() {
            [inner] if inner.is_array() => current = inner,
            _ => {
                return items
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| ParamsError::Invalid(format!("{} holds a non-number", field)))
                    })
                    .collect();
            }
        }
    }
}
