use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    None,
    Orthorhombic { lx: f32, ly: f32, lz: f32 },
    Triclinic { m: [f32; 9] },
}

impl Cell {
    /// Classifies a raw row-major 3x3 box as delivered by a source. A missing
    /// or all-zero box means no periodic cell.
    pub fn from_raw(raw: Option<[f32; 9]>) -> Cell {
        let m = match raw {
            Some(m) => m,
            None => return Cell::None,
        };
        if m.iter().all(|&v| v == 0.0) {
            return Cell::None;
        }
        let tol = 1e-5;
        let is_orth = m[1].abs() < tol
            && m[2].abs() < tol
            && m[3].abs() < tol
            && m[5].abs() < tol
            && m[6].abs() < tol
            && m[7].abs() < tol;
        if is_orth {
            Cell::Orthorhombic {
                lx: m[0],
                ly: m[4],
                lz: m[8],
            }
        } else {
            Cell::Triclinic { m }
        }
    }

    /// Diagonal box extents, if the cell is periodic with positive lengths.
    pub fn lengths(&self) -> Option<[f32; 3]> {
        let l = match *self {
            Cell::None => return None,
            Cell::Orthorhombic { lx, ly, lz } => [lx, ly, lz],
            Cell::Triclinic { m } => [m[0], m[4], m[8]],
        };
        if l.iter().any(|&v| v <= 0.0) {
            None
        } else {
            Some(l)
        }
    }

    /// Full row-major box vectors for a periodic cell.
    pub fn rows(&self) -> Option<[f32; 9]> {
        match *self {
            Cell::None => None,
            Cell::Orthorhombic { lx, ly, lz } => {
                Some([lx, 0.0, 0.0, 0.0, ly, 0.0, 0.0, 0.0, lz])
            }
            Cell::Triclinic { m } => Some(m),
        }
    }

    pub fn is_periodic(&self) -> bool {
        !matches!(self, Cell::None)
    }
}

/// One fully processed timestep, immutable once cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub cell: Cell,
    pub positions: Vec<[f32; 3]>,
}

impl Frame {
    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }
}
