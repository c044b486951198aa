//! Nearest-neighbour downsampling of loaded fields for display.

use std::collections::BTreeMap;

use get_size::GetSize;
use graphet_core::common::{FieldSet, Range};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use tracing::{instrument, trace};

/// One field resampled for display, `values` has shape `(y, x)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Raster {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub values: Array2<f64>,
}

impl Raster {
    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    /// Finite value range, for colour scaling.
    pub fn value_range(&self) -> Option<Range<f64>> {
        Range::of_finite(self.values.iter())
    }
}

/// Every field of a snapshot resampled to one target size.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSet {
    target: (usize, usize),
    x: Array1<f64>,
    y: Array1<f64>,
    layers: BTreeMap<String, Array2<f64>>,
}

impl RasterSet {
    /// Resamples `source` to at most `width x height`, never upsampling.
    #[instrument(skip(source), fields(source_width = source.width(), source_height = source.height()))]
    pub fn from_fields(source: &FieldSet, width: usize, height: usize) -> Self {
        let cols = nearest_indices(source.width(), width);
        let rows = nearest_indices(source.height(), height);
        trace!(cols = cols.len(), rows = rows.len(), "resampling");

        let layers = source
            .iter()
            .map(|(name, data)| {
                let values = data.select(Axis(0), &rows).select(Axis(1), &cols);
                (name.to_string(), values)
            })
            .collect();

        Self {
            target: (width, height),
            x: source.x().select(Axis(0), &cols),
            y: source.y().select(Axis(0), &rows),
            layers,
        }
    }

    /// The size this set was requested with, `(width, height)`.
    pub fn target(&self) -> (usize, usize) {
        self.target
    }

    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn raster(&self, name: &str) -> Option<Raster> {
        self.layers.get(name).map(|values| Raster {
            x: self.x.clone(),
            y: self.y.clone(),
            values: values.clone(),
        })
    }
}

impl GetSize for RasterSet {
    fn get_heap_size(&self) -> usize {
        let values = self.x.len() + self.y.len() + self.layers.values().map(|l| l.len()).sum::<usize>();
        values * std::mem::size_of::<f64>()
            + self.layers.keys().map(GetSize::get_heap_size).sum::<usize>()
    }
}

/// Source indices sampled at the centres of `min(target, source)` equal bins.
fn nearest_indices(source: usize, target: usize) -> Vec<usize> {
    let n = target.min(source);
    (0..n).map(|i| ((2 * i + 1) * source) / (2 * n)).collect()
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use proptest::prelude::*;

    use super::*;

    fn fields(width: usize, height: usize) -> FieldSet {
        FieldSet::new(
            Array1::linspace(-2.0, 2.0, width),
            Array1::linspace(-2.0, 2.0, height),
        )
        .with(
            "idx",
            Array2::from_shape_fn((height, width), |(y, x)| (y * 1000 + x) as f64),
        )
        .unwrap()
        .with("zeros", Array2::zeros((height, width)))
        .unwrap()
    }

    #[test]
    fn picks_bin_centres() {
        assert_eq!(nearest_indices(256, 32), (0..32).map(|i| 8 * i + 4).collect::<Vec<_>>());
        assert_eq!(nearest_indices(4, 10), vec![0, 1, 2, 3]);
        assert_eq!(nearest_indices(5, 1), vec![2]);
        assert!(nearest_indices(0, 3).is_empty());
    }

    #[test]
    fn samples_values_and_coords_together() {
        let set = RasterSet::from_fields(&fields(256, 256), 32, 16);
        assert_eq!(set.target(), (32, 16));
        let r = set.raster("idx").unwrap();
        assert_eq!((r.width(), r.height()), (32, 16));
        assert_eq!(r.values.dim(), (16, 32));
        // Row 1 samples source row 24, column 2 samples source column 20
        assert_eq!(r.values[[1, 2]], 24_020.0);
        assert_eq!(r.x[2], fields(256, 256).x()[20]);
        assert!(set.raster("nope").is_none());
    }

    proptest! {
        #[test]
        fn shape_is_capped_at_source(
            w in 1usize..80, h in 1usize..80, sw in 1usize..60, sh in 1usize..60
        ) {
            let set = RasterSet::from_fields(&fields(sw, sh), w, h);
            prop_assert_eq!(set.len(), 2);
            for key in ["idx", "zeros"] {
                let r = set.raster(key).unwrap();
                prop_assert_eq!((r.width(), r.height()), (w.min(sw), h.min(sh)));
                prop_assert_eq!(r.values.dim(), (h.min(sh), w.min(sw)));
            }
        }
    }
}
