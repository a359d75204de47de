//! Depth-aware compositing of rendered layers over a background photograph.
//!
//! Each layer is an RGBA render of one subject at the background's
//! resolution. At every pixel the frontmost covering layer is shown; pixels
//! that no layer covers keep the background.
//!
//! Steps per call:
//! 1. Normalize all rasters to `[0, 1]`.
//! 2. Build a coverage mask per layer from its alpha channel.
//! 3. With depth, keep only pixels where the layer is nearest (sentinel depth
//!    counts as infinitely far).
//! 4. Sum the masked layer colors, clip to `[0, 1]`, and fill the rest from
//!    the background.

mod depth;
mod mask;

use image::{Rgb, RgbImage, RgbaImage};
use ndarray::{Array2, Array3, ArrayView3, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use depth::DepthMap;

/// Largest value of an 8-bit channel.
const CHANNEL_MAX: f32 = 255.0;

/// Errors raised on malformed compositing input.
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("No layers to composite")]
    EmptyBatch,
    #[error("{what} {index} is {found:?} but the background is {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        index: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("Got {depths} depth maps for {layers} layers")]
    DepthCountMismatch { layers: usize, depths: usize },
    #[error("Raster does not match its declared shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A single raster or a batch of them.
///
/// Single rasters are handled as a batch of one.
#[derive(Debug)]
pub enum Batch<'a, T> {
    Single(&'a T),
    Many(&'a [T]),
}

impl<'a, T> Batch<'a, T> {
    pub fn as_slice(&self) -> &'a [T] {
        match *self {
            Batch::Single(item) => std::slice::from_ref(item),
            Batch::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<T> Clone for Batch<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Batch<'_, T> {}

impl<'a, T> From<&'a T> for Batch<'a, T> {
    fn from(item: &'a T) -> Self {
        Batch::Single(item)
    }
}

impl<'a, T> From<&'a [T]> for Batch<'a, T> {
    fn from(items: &'a [T]) -> Self {
        Batch::Many(items)
    }
}

/// What to do when several layers sit at exactly the same depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// Every tied layer paints the pixel; colors are summed and clipped.
    Blend,
    /// The layer earliest in the batch paints the pixel.
    FirstLayer,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::Blend
    }
}

/// Compositor settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompositeOptions {
    /// Policy for exact depth ties.
    pub tie_break: TieBreak,
}

/// Combines rendered layers with a background image.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    options: CompositeOptions,
}

impl Compositor {
    pub fn new(options: CompositeOptions) -> Self {
        Self { options }
    }

    /// Composite `layers` over `background`.
    ///
    /// `depth` must hold one map per layer when given. `None` or an empty
    /// batch disables occlusion: overlapping layers are summed and clipped.
    pub fn composite<'l>(
        &self,
        layers: impl Into<Batch<'l, RgbaImage>>,
        background: &RgbImage,
        depth: Option<Batch<'_, DepthMap>>,
    ) -> Result<RgbImage, CompositeError> {
        let layers: Batch<'l, RgbaImage> = layers.into();
        let layers = layers.as_slice();
        if layers.is_empty() {
            return Err(CompositeError::EmptyBatch);
        }

        let expected = background.dimensions();
        for (index, layer) in layers.iter().enumerate() {
            check_dimensions("Layer", index, expected, layer.dimensions())?;
        }

        let depths = match depth {
            Some(batch) if !batch.is_empty() => {
                let depths = batch.as_slice();
                if depths.len() != layers.len() {
                    return Err(CompositeError::DepthCountMismatch {
                        layers: layers.len(),
                        depths: depths.len(),
                    });
                }
                for (index, map) in depths.iter().enumerate() {
                    check_dimensions("Depth map", index, expected, map.dimensions())?;
                }
                Some(depths)
            }
            _ => None,
        };

        log::debug!(
            "Compositing {} layer(s) over {}x{} background, depth {}",
            layers.len(),
            expected.0,
            expected.1,
            if depths.is_some() { "on" } else { "off" }
        );

        let backdrop = normalize(background.as_raw(), background.dimensions(), 3)?;
        let normalized = layers
            .iter()
            .map(|layer| normalize(layer.as_raw(), layer.dimensions(), 4))
            .collect::<Result<Vec<_>, _>>()?;

        let mut masks: Vec<Array2<bool>> = normalized
            .iter()
            .map(|layer| mask::coverage_mask(layer.view()))
            .collect();

        if let Some(depths) = depths {
            let visible = mask::visibility_masks(depths);
            for (coverage, visible) in masks.iter_mut().zip(&visible) {
                Zip::from(coverage).and(visible).for_each(|c, &v| *c &= v);
            }
            mask::resolve_ties(&mut masks, self.options.tie_break);
        }

        let dim = (expected.1 as usize, expected.0 as usize);
        let body = mask::union_mask(&masks, dim);
        log::debug!("{} pixel(s) covered by layers", body.iter().filter(|&&b| b).count());

        let mut bodies = Array3::<f32>::zeros((dim.0, dim.1, 3));
        for (layer, mask) in normalized.iter().zip(&masks) {
            add_masked(&mut bodies, layer.view(), mask);
        }

        let mut output = RgbImage::new(expected.0, expected.1);
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let (row, col) = (y as usize, x as usize);
            let source = if body[[row, col]] { &bodies } else { &backdrop };
            *pixel = Rgb(std::array::from_fn(|c| {
                to_channel(source[[row, col, c]].clamp(0.0, 1.0))
            }));
        }

        Ok(output)
    }
}

/// Composite with default options.
pub fn composite<'l>(
    layers: impl Into<Batch<'l, RgbaImage>>,
    background: &RgbImage,
    depth: Option<Batch<'_, DepthMap>>,
) -> Result<RgbImage, CompositeError> {
    Compositor::default().composite(layers, background, depth)
}

fn check_dimensions(
    what: &'static str,
    index: usize,
    expected: (u32, u32),
    found: (u32, u32),
) -> Result<(), CompositeError> {
    if found != expected {
        return Err(CompositeError::DimensionMismatch {
            what,
            index,
            expected,
            found,
        });
    }
    Ok(())
}

/// Interleaved 8-bit samples to a `(height, width, channels)` array in `[0, 1]`.
fn normalize(
    raw: &[u8],
    (width, height): (u32, u32),
    channels: usize,
) -> Result<Array3<f32>, CompositeError> {
    let view = ArrayView3::from_shape((height as usize, width as usize, channels), raw)?;
    Ok(view.mapv(|v| v as f32 / CHANNEL_MAX))
}

/// Add the RGB of `layer` into `acc` wherever `mask` is set.
fn add_masked(acc: &mut Array3<f32>, layer: ArrayView3<'_, f32>, mask: &Array2<bool>) {
    Zip::from(acc.rows_mut())
        .and(layer.rows())
        .and(mask)
        .for_each(|mut sum, px, &m| {
            if m {
                for c in 0..3 {
                    sum[c] += px[c];
                }
            }
        });
}

fn to_channel(value: f32) -> u8 {
    (value * CHANNEL_MAX).round() as u8
}
