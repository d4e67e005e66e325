//! OMS error types

use thiserror::Error;

use crate::Symbol;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OmsError {
    /// An open position has no mark; callers must price every open symbol
    #[error("no mark price supplied for open position {0}")]
    MissingMarkPrice(Symbol),
}

pub type OmsResult<T> = Result<T, OmsError>;
