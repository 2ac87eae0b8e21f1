//! Re-exports the crate's traits for glob import.

pub use crate::{BlockDevice as _, Read as _};
