use std::sync::Arc;

use crate::error::{StrideError, StrideResult};
use crate::ranges::{compact_ranges, ranges_atom_count, AtomRange};

/// Consumer-side model of the structure a trajectory animates: the total
/// atom count plus an optional filtered selection of active atoms.
#[derive(Debug, Clone)]
pub struct Structure {
    atom_count: usize,
    selection: Option<Vec<usize>>,
    ranges: Arc<Vec<AtomRange>>,
}

impl Structure {
    /// Full structure, every atom active.
    pub fn new(atom_count: usize) -> Self {
        Self {
            atom_count,
            selection: None,
            ranges: Arc::new(full_ranges(atom_count)),
        }
    }

    /// Structure restricted to a sorted, strictly ascending list of atom
    /// indices. An empty list selects the full structure.
    pub fn with_selection(atom_count: usize, selection: Vec<usize>) -> StrideResult<Self> {
        for pair in selection.windows(2) {
            if pair[1] <= pair[0] {
                return Err(StrideError::InvalidSelection(
                    "atom indices must be sorted and unique".into(),
                ));
            }
        }
        if let Some(&last) = selection.last() {
            if last >= atom_count {
                return Err(StrideError::InvalidSelection(format!(
                    "atom index {last} out of range for {atom_count} atoms"
                )));
            }
        }
        let ranges = if selection.is_empty() {
            full_ranges(atom_count)
        } else {
            compact_ranges(&selection)
        };
        Ok(Self {
            atom_count,
            selection: Some(selection),
            ranges: Arc::new(ranges),
        })
    }

    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    pub fn selection(&self) -> Option<&[usize]> {
        self.selection.as_deref()
    }

    /// Compacted request ranges covering the active atoms, shared with the
    /// source layer without copying.
    pub fn request_ranges(&self) -> Arc<Vec<AtomRange>> {
        self.ranges.clone()
    }

    /// Number of atoms a source delivers per frame for this structure.
    pub fn active_atom_count(&self) -> usize {
        ranges_atom_count(&self.ranges)
    }

    /// Position of a global atom index within the delivered coordinate
    /// buffer, or `None` when the atom is not active.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        let mut offset = 0;
        for r in self.ranges.iter() {
            if r.contains(index) {
                return Some(offset + (index - r.start));
            }
            offset += r.len();
        }
        None
    }
}

fn full_ranges(atom_count: usize) -> Vec<AtomRange> {
    if atom_count == 0 {
        Vec::new()
    } else {
        vec![AtomRange {
            start: 0,
            end: atom_count,
        }]
    }
}
