//! Approximate in-memory footprint of loaded data.

use std::{
    collections::HashSet,
    fmt::{self, Display},
    sync::Arc,
};

use get_size::GetSize;
use serde::Serialize;

const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Formats a byte count with binary prefixes, e.g. `1.5 KiB`. Everything
/// from 1024 ZiB up is expressed in YiB.
pub fn format_bytes(bytes: usize) -> String {
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{num:3.1} {unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1} YiB")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MemoryUsage(pub usize);

impl MemoryUsage {
    pub fn bytes(self) -> usize {
        self.0
    }
}

impl Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_bytes(self.0))
    }
}

/// Sums sizes over an object graph, counting each shared allocation once.
#[derive(Debug, Default)]
pub struct SizeWalker {
    seen: HashSet<usize>,
    total: usize,
}

impl SizeWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&mut self, bytes: usize) {
        self.total += bytes;
    }

    /// Heap size of a value whose stack part is already counted.
    pub fn add_heap<T: GetSize>(&mut self, value: &T) {
        self.total += value.get_heap_size();
    }

    /// Full size of a shared value, unless this allocation was seen before.
    pub fn add_shared<T: GetSize>(&mut self, value: &Arc<T>) {
        if self.seen.insert(Arc::as_ptr(value) as usize) {
            self.total += value.get_size();
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
