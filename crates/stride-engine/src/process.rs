use serde::{Deserialize, Serialize};

use stride_core::frame::Cell;
use stride_core::pbc;
use stride_core::superpose;

fn default_true() -> bool {
    true
}

/// Per-frame coordinate post-processing switches. The stages run in a fixed
/// order: center, remove periodicity, unwrap, superpose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default = "default_true")]
    pub center_pbc: bool,
    #[serde(default = "default_true")]
    pub remove_periodicity: bool,
    #[serde(default = "default_true")]
    pub remove_pbc: bool,
    #[serde(default = "default_true")]
    pub superpose: bool,
    /// Global atom indices driving the centering means and the rigid-body
    /// fit. `None` uses every delivered atom.
    #[serde(default)]
    pub fit_indices: Option<Vec<usize>>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            center_pbc: true,
            remove_periodicity: true,
            remove_pbc: true,
            superpose: true,
            fit_indices: None,
        }
    }
}

impl ProcessingOptions {
    /// Everything off; frames pass through untouched.
    pub fn raw() -> Self {
        Self {
            center_pbc: false,
            remove_periodicity: false,
            remove_pbc: false,
            superpose: false,
            fit_indices: None,
        }
    }
}

/// Applies the configured stages to one delivered coordinate buffer.
/// Deterministic: identical input, options and reference produce identical
/// output.
pub struct CoordinateProcessor {
    options: ProcessingOptions,
    fit_positions: Option<Vec<usize>>,
}

impl CoordinateProcessor {
    pub fn new(options: ProcessingOptions) -> Self {
        Self {
            options,
            fit_positions: None,
        }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ProcessingOptions) {
        self.options = options;
    }

    /// Fit atoms as positions within the delivered buffer, mapped by the
    /// orchestrator from the configured global indices.
    pub fn set_fit_positions(&mut self, positions: Option<Vec<usize>>) {
        self.fit_positions = positions;
    }

    pub fn fit_subset(&self) -> Option<&[usize]> {
        self.fit_positions.as_deref()
    }

    pub fn wants_reference(&self) -> bool {
        self.options.superpose
    }

    /// Periodic-boundary stages. A frame with no usable cell passes through.
    pub fn pbc_stage(&self, coords: &mut [[f32; 3]], cell: Cell) {
        if !cell.is_periodic() {
            return;
        }
        let lengths = cell.lengths();
        if self.options.center_pbc {
            if let Some(lengths) = lengths {
                pbc::center_pbc(coords, lengths, self.fit_subset());
            }
        }
        if self.options.remove_periodicity {
            if let Some(lengths) = lengths {
                pbc::remove_periodicity(coords, lengths, self.fit_subset());
            }
        }
        if self.options.remove_pbc {
            if let Some(rows) = cell.rows() {
                pbc::remove_pbc(coords, rows);
            }
        }
    }

    /// The post-PBC coordinates of the fit subset, stored as the alignment
    /// reference when the reference frame first arrives.
    pub fn capture_reference(&self, coords: &[[f32; 3]]) -> Vec<[f32; 3]> {
        match self.fit_subset() {
            Some(positions) => superpose::gather(coords, positions),
            None => coords.to_vec(),
        }
    }

    /// Rigid-body superposition onto the captured reference. Fewer than the
    /// minimum fit atoms leaves the coordinates unaligned.
    pub fn superpose_stage(&self, coords: &mut [[f32; 3]], reference: &[[f32; 3]]) {
        if !self.options.superpose {
            return;
        }
        let transform = match self.fit_subset() {
            Some(positions) => {
                let moving = superpose::gather(coords, positions);
                superpose::fit_transform(&moving, reference)
            }
            None => superpose::fit_transform(coords, reference),
        };
        match transform {
            Some((r, t)) => superpose::apply_transform(coords, &r, &t),
            None => log::warn!(
                "superposition skipped: fewer than {} usable fit atoms",
                superpose::MIN_FIT_ATOMS
            ),
        }
    }
}
