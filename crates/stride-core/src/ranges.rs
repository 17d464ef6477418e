use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Half-open interval of global atom indices, `start < end`. Serializes as
/// the two-element array `[start, end]` used on the request wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomRange {
    pub start: usize,
    pub end: usize,
}

impl AtomRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

impl Serialize for AtomRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.start, self.end).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AtomRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (start, end) = <(usize, usize)>::deserialize(deserializer)?;
        if start >= end {
            return Err(D::Error::custom(format!(
                "atom range [{start}, {end}) is empty"
            )));
        }
        Ok(AtomRange { start, end })
    }
}

/// Compacts a sorted, deduplicated ascending index list into maximal
/// contiguous ranges with a single left-to-right scan.
pub fn compact_ranges(indices: &[usize]) -> Vec<AtomRange> {
    let mut out = Vec::new();
    if indices.is_empty() {
        return out;
    }
    let mut run_start = indices[0];
    let mut prev = indices[0];
    for &idx in &indices[1..] {
        if idx > prev + 1 {
            out.push(AtomRange {
                start: run_start,
                end: prev + 1,
            });
            run_start = idx;
        }
        prev = idx;
    }
    out.push(AtomRange {
        start: run_start,
        end: prev + 1,
    });
    out
}

/// Total number of atoms covered by a set of disjoint ranges.
pub fn ranges_atom_count(ranges: &[AtomRange]) -> usize {
    ranges.iter().map(|r| r.len()).sum()
}
