use std::collections::BTreeMap;

use get_size::GetSize;
use ndarray::Array1;
use serde::Serialize;

/// The particle records of one snapshot: named flat arrays, one value per
/// particle. Different keys may hold different species and so differ in length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticleSet {
    records: BTreeMap<String, Array1<f64>>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Array1<f64>) {
        self.records.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> Option<&Array1<f64>> {
        self.records.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn value_count(&self) -> usize {
        self.records.values().map(|a| a.len()).sum()
    }
}

impl FromIterator<(String, Array1<f64>)> for ParticleSet {
    fn from_iter<T: IntoIterator<Item = (String, Array1<f64>)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl GetSize for ParticleSet {
    fn get_heap_size(&self) -> usize {
        self.value_count() * std::mem::size_of::<f64>()
            + self.records.keys().map(GetSize::get_heap_size).sum::<usize>()
    }
}
