//! Combining per-step reads into one array with a leading time axis.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, ArrayView, Axis, Dimension, IxDyn};

use super::PluginError;

/// Stacks equally shaped per-step arrays along a new leading axis.
pub fn stack_steps<D: Dimension>(
    name: &str,
    per_step: &[ndarray::Array<f64, D>],
) -> Result<ArrayD<f64>, PluginError> {
    if per_step.is_empty() {
        return Err(PluginError::NoSteps(name.to_string()));
    }
    let views: Vec<ArrayView<f64, IxDyn>> = per_step.iter().map(|a| a.view().into_dyn()).collect();
    ndarray::stack(Axis(0), &views).map_err(|source| PluginError::Stack {
        name: name.to_string(),
        source,
    })
}

/// Stacks variable-length records, padding every step to the longest one
/// with NaN. Positions in different steps need not be the same particle.
pub fn pad_ragged(per_step: &[Array1<f64>]) -> Array2<f64> {
    let width = per_step.iter().map(|a| a.len()).max().unwrap_or(0);
    let mut out = Array2::from_elem((per_step.len(), width), f64::NAN);
    for (mut row, values) in out.outer_iter_mut().zip(per_step) {
        row.slice_mut(ndarray::s![..values.len()]).assign(values);
    }
    out
}

/// Aligns records across steps by persistent id (outer join). Returns the
/// sorted ids and a `(steps, ids)` array with NaN where an id is absent.
pub fn align_by_index(
    name: &str,
    per_step: &[(Array1<u64>, Array1<f64>)],
) -> Result<(Array1<u64>, Array2<f64>), PluginError> {
    let mut columns = BTreeMap::new();
    for (ids, values) in per_step {
        if ids.len() != values.len() {
            return Err(PluginError::IndexLength {
                name: name.to_string(),
                ids: ids.len(),
                values: values.len(),
            });
        }
        for &id in ids {
            columns.insert(id, 0);
        }
    }
    for (col, slot) in columns.values_mut().enumerate() {
        *slot = col;
    }

    let mut out = Array2::from_elem((per_step.len(), columns.len()), f64::NAN);
    for (step, (ids, values)) in per_step.iter().enumerate() {
        for (id, &v) in ids.iter().zip(values) {
            out[[step, columns[id]]] = v;
        }
    }
    Ok((columns.into_keys().collect(), out))
}

/// Drops every axis of length 1.
pub fn squeeze(mut data: ArrayD<f64>) -> ArrayD<f64> {
    while let Some(axis) = data.shape().iter().position(|&n| n == 1) {
        data = data.index_axis_move(Axis(axis), 0);
    }
    data
}
