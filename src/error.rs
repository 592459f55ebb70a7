//! Error types for the transient solver

use thiserror::Error;

use crate::model::SubdomainId;

/// Main error type for analysis and solver operations
#[derive(Error, Debug)]
pub enum FEAError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(
        "Singular matrix in subdomain {subdomain}: pivot {pivot_index} = {pivot:e} is below tolerance \
         - model may be unconstrained or have insufficient supports"
    )]
    SingularMatrix {
        subdomain: SubdomainId,
        pivot_index: usize,
        pivot: f64,
    },

    #[error("Analyzer not initialized - run initialize() first")]
    NotInitialized,

    #[error("No operator has been assembled for subdomain {0}")]
    MissingOperator(SubdomainId),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Subdomain {0} not found")]
    SubdomainNotFound(SubdomainId),

    #[error("Duplicate name '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl FEAError {
    /// Shorthand used by vector/matrix size checks
    pub fn dimension(expected: usize, found: usize) -> Self {
        Self::DimensionMismatch { expected, found }
    }
}

/// Result type for FEA operations
pub type FEAResult<T> = Result<T, FEAError>;
