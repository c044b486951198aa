use std::fmt::{self, Display};

use ndarray::{Array, Dimension};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AxisError {
    #[error("Unknown axis {0:?}, expected one of x, y, z")]
    UnknownAxis(char),
    #[error("Axis {0:?} appears more than once")]
    DuplicateAxis(char),
    #[error("Swap {swap:?} is out of range for {len} axes")]
    SwapOutOfRange { swap: (usize, usize), len: usize },
    #[error("Array {name:?} has {found} axes, the layout has {expected}")]
    Rank {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// On-disk axis order and the swaps that turn it into the order callers see.
///
/// The effective order is computed once. A swapped axis keeps its letter,
/// so data and coordinates of axis `y` stay together, while field names are
/// translated by position (with `zyx` and swap `(0, 1)`, asking for `by`
/// reads the on-disk `bz`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisLayout {
    original: Vec<char>,
    effective: Vec<char>,
    swaps: Vec<(usize, usize)>,
}

impl AxisLayout {
    pub fn new(original: &str, swaps: Vec<(usize, usize)>) -> Result<Self, AxisError> {
        let original: Vec<char> = original.chars().filter(|c| *c != ',').collect();
        for (i, &c) in original.iter().enumerate() {
            if !matches!(c, 'x' | 'y' | 'z') {
                return Err(AxisError::UnknownAxis(c));
            }
            if original[..i].contains(&c) {
                return Err(AxisError::DuplicateAxis(c));
            }
        }

        let mut effective = original.clone();
        for &(a, b) in &swaps {
            if a >= effective.len() || b >= effective.len() {
                return Err(AxisError::SwapOutOfRange {
                    swap: (a, b),
                    len: effective.len(),
                });
            }
            effective.swap(a, b);
        }

        Ok(Self {
            original,
            effective,
            swaps,
        })
    }

    pub fn original(&self) -> String {
        self.original.iter().collect()
    }

    pub fn effective(&self) -> String {
        self.effective.iter().collect()
    }

    pub fn effective_axes(&self) -> impl Iterator<Item = char> + '_ {
        self.effective.iter().copied()
    }

    pub fn swaps(&self) -> &[(usize, usize)] {
        &self.swaps
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Translates the trailing axis letters of a field name (`bx`, `xx`) to
    /// the on-disk name.
    pub fn to_disk(&self, name: &str) -> String {
        translate(name, &self.effective, &self.original)
    }

    /// Inverse of [`AxisLayout::to_disk`].
    pub fn to_effective(&self, name: &str) -> String {
        translate(name, &self.original, &self.effective)
    }

    /// Reorders the axes of an on-disk array into the effective order.
    pub fn permute<D: Dimension>(
        &self,
        name: &str,
        mut data: Array<f64, D>,
    ) -> Result<Array<f64, D>, AxisError> {
        if self.swaps.is_empty() {
            return Ok(data);
        }
        if data.ndim() != self.len() {
            return Err(AxisError::Rank {
                name: name.to_string(),
                expected: self.len(),
                found: data.ndim(),
            });
        }
        for &(a, b) in &self.swaps {
            data.swap_axes(a, b);
        }
        Ok(data)
    }
}

impl Default for AxisLayout {
    fn default() -> Self {
        Self {
            original: vec!['z', 'y', 'x'],
            effective: vec!['z', 'y', 'x'],
            swaps: Vec::new(),
        }
    }
}

impl Display for AxisLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.original(), self.effective())
    }
}

fn translate(name: &str, from: &[char], to: &[char]) -> String {
    let stem_len = name.trim_end_matches(['x', 'y', 'z']).len();
    let (stem, axes) = name.split_at(stem_len);
    let mut out = String::with_capacity(name.len());
    out.push_str(stem);
    for c in axes.chars() {
        match from.iter().position(|&f| f == c) {
            Some(i) => out.push(to[i]),
            None => out.push(c),
        }
    }
    out
}
