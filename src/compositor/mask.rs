//! Coverage and visibility masks.

use ndarray::{Array2, ArrayView3, Axis, Zip};

use super::{DepthMap, TieBreak};

/// Index of the alpha channel in a normalized RGBA layer.
const ALPHA: usize = 3;

/// True wherever the layer's alpha is nonzero.
pub(super) fn coverage_mask(layer: ArrayView3<'_, f32>) -> Array2<bool> {
    layer.index_axis(Axis(2), ALPHA).mapv(|alpha| alpha > 0.0)
}

/// For each layer, true where its depth equals the nearest depth of all layers.
///
/// Sentinel depths are treated as infinitely far. Exact ties mark every tied
/// layer as visible.
pub(super) fn visibility_masks(depths: &[DepthMap]) -> Vec<Array2<bool>> {
    let far: Vec<Array2<f32>> = depths.iter().map(DepthMap::with_far_sentinel).collect();

    let Some(first) = far.first() else {
        return Vec::new();
    };

    let mut nearest = Array2::from_elem(first.raw_dim(), f32::INFINITY);
    for depth in &far {
        Zip::from(&mut nearest)
            .and(depth)
            .for_each(|n, &d| *n = n.min(d));
    }

    far.iter()
        .map(|depth| Zip::from(depth).and(&nearest).map_collect(|&d, &n| d == n))
        .collect()
}

/// Resolve pixels claimed by more than one effective mask.
///
/// With [`TieBreak::FirstLayer`] the lowest batch index keeps the pixel and
/// later layers drop it. [`TieBreak::Blend`] leaves the masks untouched.
pub(super) fn resolve_ties(masks: &mut [Array2<bool>], tie_break: TieBreak) {
    if tie_break == TieBreak::Blend {
        return;
    }

    let Some(first) = masks.first() else {
        return;
    };

    let mut claimed = Array2::from_elem(first.raw_dim(), false);
    for mask in masks.iter_mut() {
        Zip::from(mask).and(&mut claimed).for_each(|m, c| {
            if *c {
                *m = false;
            } else if *m {
                *c = true;
            }
        });
    }
}

/// Logical OR of all masks.
pub(super) fn union_mask(masks: &[Array2<bool>], dim: (usize, usize)) -> Array2<bool> {
    let mut union = Array2::from_elem(dim, false);
    for mask in masks {
        Zip::from(&mut union).and(mask).for_each(|u, &m| *u |= m);
    }
    union
}
