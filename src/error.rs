//! Crate-level error type.
//!
//! Each concern has its own error enum; [`Error`] wraps them for callers of
//! the host binding that cross several layers in one call.

use thiserror::Error;

use crate::adapters::TransportError;
use crate::core::TreeError;
use crate::domain::{AssetRef, DefinitionError, IdentifierError};
use crate::wire::DecodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Failed to decode structured data: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Commit of {asset} was rejected: {message}")]
    CommitFailure { asset: AssetRef, message: String },

    #[error("Asset {0} carries neither a definition id nor a definition path")]
    MissingDefinition(AssetRef),

    #[error("No asset resolver configured")]
    NoResolver,
}

pub type Result<T> = std::result::Result<T, Error>;
