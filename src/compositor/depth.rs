//! Per-layer depth buffers.

use ndarray::{Array2, ShapeError};

/// Camera-to-surface distance for every pixel of one rendered layer.
///
/// Stored row-major as `(height, width)`. Pixels where the layer has no
/// surface hold [`DepthMap::NO_SURFACE`].
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    data: Array2<f32>,
}

impl DepthMap {
    /// Sentinel written by renderers where nothing was drawn.
    pub const NO_SURFACE: f32 = 0.0;

    /// Create a depth map with no surface anywhere.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: Array2::from_elem((height as usize, width as usize), Self::NO_SURFACE),
        }
    }

    /// Wrap an existing `(height, width)` array.
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Build from row-major samples. Fails if `data.len() != width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Result<Self, ShapeError> {
        let data = Array2::from_shape_vec((height as usize, width as usize), data)?;
        Ok(Self { data })
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Depth at pixel (x, y).
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[[y as usize, x as usize]]
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        self.data[[y as usize, x as usize]] = depth;
    }

    /// Number of pixels holding a real surface.
    pub fn covered_pixels(&self) -> usize {
        self.data.iter().filter(|&&d| d != Self::NO_SURFACE).count()
    }

    /// Copy with every sentinel pushed to +inf so it loses any depth test.
    pub(crate) fn with_far_sentinel(&self) -> Array2<f32> {
        self.data.mapv(|d| if d == Self::NO_SURFACE { f32::INFINITY } else { d })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_map_has_no_surface() {
        let map = DepthMap::new(4, 3);
        assert_eq!(map.dimensions(), (4, 3));
        assert_eq!(map.covered_pixels(), 0);
        assert_eq!(map.get(3, 2), DepthMap::NO_SURFACE);
    }

    #[test]
    fn from_raw_is_row_major() {
        let map = DepthMap::from_raw(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(map.get(2, 0), 3.0);
        assert_eq!(map.get(0, 1), 4.0);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(DepthMap::from_raw(3, 2, vec![1.0; 5]).is_err());
    }

    #[test]
    fn sentinel_becomes_infinite() {
        let mut map = DepthMap::new(2, 1);
        map.set(1, 0, 2.5);
        let far = map.with_far_sentinel();
        assert!(far[[0, 0]].is_infinite());
        assert_eq!(far[[0, 1]], 2.5);
        assert_eq!(map.covered_pixels(), 1);
    }
}
