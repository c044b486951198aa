use std::ops::{Div, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range<N> {
    pub min: N,
    pub max: N,
}

impl<N> Range<N> {
    pub fn new(min: N, max: N) -> Self {
        Self { min, max }
    }
}

impl<N: Default> Default for Range<N> {
    fn default() -> Self {
        Self {
            min: N::default(),
            max: N::default(),
        }
    }
}

impl<N: Sub<Output = N> + Div<Output = N> + Copy> Range<N> {
    pub fn width(&self) -> <N as Sub>::Output {
        self.max - self.min
    }

    /// Maps `value` into `0..=1` relative to this range.
    pub fn map(&self, value: N) -> <<N as Sub>::Output as Div>::Output {
        (value - self.min) / self.width()
    }
}

impl<N> Range<N> {
    pub fn into_range_inclusive(self) -> std::ops::RangeInclusive<N> {
        self.min..=self.max
    }
}

impl<N: PartialOrd + Copy> Range<N> {
    pub fn expand(&self, new: N) -> Self {
        Self::new(
            if self.min < new { self.min } else { new },
            if self.max > new { self.max } else { new },
        )
    }

    pub fn max(&self, new: Range<N>) -> Self {
        Self::new(
            if self.min < new.min {
                self.min
            } else {
                new.min
            },
            if self.max > new.max {
                self.max
            } else {
                new.max
            },
        )
    }

    /// `None` for an empty iterator.
    pub fn from_iter_val(iter: impl IntoIterator<Item = N>) -> Option<Range<N>> {
        iter.into_iter().fold(None, |acc, n| match acc {
            Some(acc) => Some(acc.expand(n)),
            None => Some(Range::new(n, n)),
        })
    }
}

impl Range<f64> {
    /// Like [`Range::from_iter_val`], skipping NaN padding.
    pub fn of_finite<'a>(iter: impl IntoIterator<Item = &'a f64>) -> Option<Range<f64>> {
        Self::from_iter_val(iter.into_iter().copied().filter(|v| v.is_finite()))
    }
}
