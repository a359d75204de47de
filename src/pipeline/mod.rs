//! Batch driver: render every fitted subject of every image and composite them.
//!
//! Expected layout under the data folder:
//!
//! ```text
//! meshes/<image stem>/<subject>.obj
//! results/<image stem>/<subject>.json
//! ```
//!
//! Images are processed one after another; a failing image is reported and
//! the batch moves on.

use std::path::{Path, PathBuf};

use image::{RgbImage, RgbaImage};
use thiserror::Error;

use crate::compositor::{Batch, CompositeError, CompositeOptions, Compositor, DepthMap};
use crate::config::{OverlayConfig, ParamsError, SubjectFailurePolicy, SubjectParams};
use crate::export::OverlayExporter;
use crate::mesh::{Mesh, MeshError};
use crate::render::{render_subject, RenderEngine, RenderError, RenderOutput};

/// Errors that can occur while processing an image.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image {image} has {meshes} meshes but {params} parameter records")]
    SubjectCountMismatch {
        image: String,
        meshes: usize,
        params: usize,
    },
    #[error("No parameter record for subject {subject} of image {image}")]
    MissingParams { image: String, subject: String },
    #[error("Subject {subject}: {source}")]
    Mesh {
        subject: String,
        #[source]
        source: MeshError,
    },
    #[error("Subject {subject}: {source}")]
    Params {
        subject: String,
        #[source]
        source: ParamsError,
    },
    #[error("Subject {subject}: {source}")]
    Render {
        subject: String,
        #[source]
        source: RenderError,
    },
    #[error("None of the {attempted} subject(s) of image {image} could be rendered")]
    NoRenderableSubjects { image: String, attempted: usize },
    #[error("Compositing failed: {0}")]
    Composite(#[from] CompositeError),
}

/// One fitted subject of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// File stem shared by the mesh and its parameter record.
    pub id: String,
    pub mesh_path: PathBuf,
    pub params_path: PathBuf,
}

/// Result of processing a single image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    /// At least one subject rendered and compositing ran.
    Composited {
        /// Subjects that made it into the composite.
        rendered: usize,
        /// Files written, in order.
        written: Vec<PathBuf>,
    },
    /// Nothing was fitted for this image.
    NoSubjects { copied: Option<PathBuf> },
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped_empty: usize,
    /// Image file name and error message of every failed image.
    pub failed: Vec<(String, String)>,
}

/// Renders and composites all images described by an [`OverlayConfig`].
pub struct OverlayPipeline {
    config: OverlayConfig,
    engine: Box<dyn RenderEngine>,
    compositor: Compositor,
}

impl OverlayPipeline {
    pub fn new(config: OverlayConfig, engine: Box<dyn RenderEngine>) -> Self {
        let compositor = Compositor::new(CompositeOptions {
            tie_break: config.tie_break,
        });
        Self {
            config,
            engine,
            compositor,
        }
    }

    /// Process every image in the input folder.
    pub fn run(&self) -> Result<BatchReport, PipelineError> {
        if self.config.save || self.config.copy_empty {
            std::fs::create_dir_all(&self.config.output_dir)?;
        }

        let images = self.list_images()?;
        log::info!("Found {} image(s) in {}", images.len(), self.config.images_dir.display());

        let mut report = BatchReport::default();
        for (index, path) in images.iter().enumerate() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            log::info!("[{}/{}] {}", index + 1, images.len(), name);

            match self.process_image(path) {
                Ok(ImageOutcome::Composited { .. }) => report.processed += 1,
                Ok(ImageOutcome::NoSubjects { .. }) => report.skipped_empty += 1,
                Err(e) => {
                    log::error!("Failed to process {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        log::info!(
            "Done: {} composited, {} without subjects, {} failed",
            report.processed,
            report.skipped_empty,
            report.failed.len()
        );
        Ok(report)
    }

    /// Render and composite all subjects of one image.
    pub fn process_image(&self, image_path: &Path) -> Result<ImageOutcome, PipelineError> {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let subjects = match self.discover_subjects(&stem)? {
            Some(subjects) if !subjects.is_empty() => subjects,
            _ => {
                log::info!("No mesh generated for image {}", stem);
                let copied = if self.config.copy_empty {
                    Some(OverlayExporter::copy_unchanged(image_path, &self.config.output_dir)?)
                } else {
                    None
                };
                return Ok(ImageOutcome::NoSubjects { copied });
            }
        };

        let background = image::open(image_path)?.to_rgb8();
        let (width, height) = background.dimensions();
        log::debug!("{}: {}x{}, {} subject(s)", stem, width, height, subjects.len());

        let mut layers: Vec<RgbaImage> = Vec::with_capacity(subjects.len());
        let mut depths: Vec<DepthMap> = Vec::with_capacity(subjects.len());
        let mut written = Vec::new();

        for subject in &subjects {
            let output = match self.render(subject, width, height) {
                Ok(output) => output,
                Err(e) => match self.config.on_subject_error {
                    SubjectFailurePolicy::AbortImage => return Err(e),
                    SubjectFailurePolicy::SkipSubject => {
                        log::warn!("Skipping subject {} of {}: {}", subject.id, stem, e);
                        continue;
                    }
                },
            };

            if self.config.save_per_subject {
                let depth = self.config.use_depth.then(|| Batch::Single(&output.depth));
                let overlay = self.compositor.composite(&output.color, &background, depth)?;
                if let Some(path) = self.save(&overlay, &stem, Some(subject.id.as_str()))? {
                    written.push(path);
                }
            }

            layers.push(output.color);
            depths.push(output.depth);
        }

        if layers.is_empty() {
            return Err(PipelineError::NoRenderableSubjects {
                image: stem,
                attempted: subjects.len(),
            });
        }

        if layers.len() > 1 || !self.config.save_per_subject {
            let depth = self.config.use_depth.then(|| Batch::Many(depths.as_slice()));
            let overlay = self.compositor.composite(layers.as_slice(), &background, depth)?;
            if let Some(path) = self.save(&overlay, &stem, None)? {
                written.push(path);
            }
        }

        Ok(ImageOutcome::Composited {
            rendered: layers.len(),
            written,
        })
    }

    /// Pair up mesh files and parameter records for an image.
    ///
    /// Returns `None` when no mesh folder exists for the image.
    pub fn discover_subjects(
        &self,
        image_stem: &str,
    ) -> Result<Option<Vec<Subject>>, PipelineError> {
        let mesh_dir = self.config.mesh_root().join(image_stem);
        if !mesh_dir.is_dir() {
            return Ok(None);
        }
        let results_dir = self.config.results_root().join(image_stem);

        let meshes = list_files(&mesh_dir)?;
        let params = if results_dir.is_dir() {
            list_files(&results_dir)?
        } else {
            Vec::new()
        };

        if meshes.len() != params.len() {
            return Err(PipelineError::SubjectCountMismatch {
                image: image_stem.to_string(),
                meshes: meshes.len(),
                params: params.len(),
            });
        }

        meshes
            .into_iter()
            .map(|mesh_path| {
                let id = mesh_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let params_path = results_dir.join(format!("{}.json", id));
                if !params_path.is_file() {
                    return Err(PipelineError::MissingParams {
                        image: image_stem.to_string(),
                        subject: id,
                    });
                }
                Ok(Subject {
                    id,
                    mesh_path,
                    params_path,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn render(
        &self,
        subject: &Subject,
        width: u32,
        height: u32,
    ) -> Result<RenderOutput, PipelineError> {
        let params =
            SubjectParams::load(&subject.params_path).map_err(|source| PipelineError::Params {
                subject: subject.id.clone(),
                source,
            })?;
        let mesh = Mesh::load(&subject.mesh_path).map_err(|source| PipelineError::Mesh {
            subject: subject.id.clone(),
            source,
        })?;

        let focal_length = params.focal_length.unwrap_or(self.config.focal_length);
        log::info!("Rendering subject {} (focal length {})", subject.id, focal_length);

        render_subject(
            self.engine.as_ref(),
            &mesh,
            width,
            height,
            params.camera_center,
            params.camera_translation,
            focal_length,
        )
        .map_err(|source| PipelineError::Render {
            subject: subject.id.clone(),
            source,
        })
    }

    fn save(
        &self,
        overlay: &RgbImage,
        stem: &str,
        subject: Option<&str>,
    ) -> Result<Option<PathBuf>, PipelineError> {
        if !self.config.save {
            return Ok(None);
        }
        let path =
            OverlayExporter::save_composite(overlay, &self.config.output_dir, stem, subject)?;
        Ok(Some(path))
    }

    fn list_images(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut images: Vec<PathBuf> = list_files(&self.config.images_dir)?
            .into_iter()
            .filter(|p| self.config.is_image(p))
            .collect();
        images.sort();
        Ok(images)
    }
}

/// Regular, non-hidden files of a directory, sorted by name.
fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
