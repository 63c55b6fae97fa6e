//! Error types, re-exported from `pl-error`

pub use pl_error::{ErrorKind, PlinthError, Result};
