#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod pbc;
pub mod ranges;
pub mod structure;
pub mod superpose;

pub use error::{StrideError, StrideResult};
pub use frame::{Cell, Frame};
pub use pbc::{center_pbc, circular_mean, remove_pbc, remove_periodicity};
pub use ranges::{compact_ranges, ranges_atom_count, AtomRange};
pub use structure::Structure;
pub use superpose::{apply_transform, fit_transform, gather, MIN_FIT_ATOMS};
