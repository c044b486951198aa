use std::collections::BTreeMap;

use get_size::GetSize;
use ndarray::{Array1, Array2};
use serde::Serialize;

use super::labeled::ArrayError;

/// The fields of one snapshot: named 2-D arrays of shape `(y, x)` sharing
/// one pair of coordinate vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSet {
    x: Array1<f64>,
    y: Array1<f64>,
    fields: BTreeMap<String, Array2<f64>>,
}

impl FieldSet {
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> Self {
        Self {
            x,
            y,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Array2<f64>) -> Result<(), ArrayError> {
        let name = name.into();
        let expected = [self.height(), self.width()];
        if data.shape() != expected {
            return Err(ArrayError::FieldShape {
                name,
                expected: expected.to_vec(),
                found: data.shape().to_vec(),
            });
        }
        self.fields.insert(name, data);
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, data: Array2<f64>) -> Result<Self, ArrayError> {
        self.insert(name, data)?;
        Ok(self)
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.fields.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of `f64` values held, coordinates included.
    pub fn value_count(&self) -> usize {
        self.x.len() + self.y.len() + self.fields.values().map(|a| a.len()).sum::<usize>()
    }
}

impl GetSize for FieldSet {
    fn get_heap_size(&self) -> usize {
        self.value_count() * std::mem::size_of::<f64>()
            + self.fields.keys().map(GetSize::get_heap_size).sum::<usize>()
    }
}
