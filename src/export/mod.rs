//! Writing composited images to the output folder.

use std::path::{Path, PathBuf};

use image::RgbImage;

/// Suffix of the composite holding every subject of an image.
pub const ALL_SUBJECTS: &str = "all";

/// Saves overlay results.
pub struct OverlayExporter;

impl OverlayExporter {
    /// File name for an image's composite: `<stem>_<subject>.png`, or `<stem>_all.png`.
    pub fn file_name(image_stem: &str, subject: Option<&str>) -> String {
        format!("{}_{}.png", image_stem, subject.unwrap_or(ALL_SUBJECTS))
    }

    /// Save a composite as PNG under `output_dir`, returning the written path.
    pub fn save_composite(
        image: &RgbImage,
        output_dir: &Path,
        image_stem: &str,
        subject: Option<&str>,
    ) -> Result<PathBuf, image::ImageError> {
        let path = output_dir.join(Self::file_name(image_stem, subject));
        image.save(&path)?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }

    /// Copy a source image into `output_dir` under its own name.
    pub fn copy_unchanged(source: &Path, output_dir: &Path) -> std::io::Result<PathBuf> {
        let name = source.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            )
        })?;
        let target = output_dir.join(name);
        std::fs::copy(source, &target)?;
        log::info!("Copied {} unchanged", source.display());
        Ok(target)
    }
}
