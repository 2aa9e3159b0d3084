use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoxError>;

#[derive(Error, Debug, Clone)]
pub enum CoxError {
    /// blocks, times, events or coefficient vectors that don't line up
    #[error("shape mismatch: {message}")]
    ShapeMismatch { message: String },

    #[error("cooperative fit needs 2 or 3 feature blocks, got {found}")]
    InvalidBlockCount { found: usize },

    /// the minimizer never saw a finite objective value
    #[error("minimizer failed: {message}")]
    MinimizerFailed { message: String },

    #[error("no coefficients yet, fit the model first")]
    NotFitted,

    #[error("invalid setting {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// too few events for a baseline, no comparable pairs, every fold failed
    #[error("degenerate fit: {message}")]
    Degenerate { message: String },

    #[error("invalid cohort: {message}")]
    InvalidCohort { message: String },
}

impl CoxError {
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch { message: message.into() }
    }

    pub fn invalid_block_count(found: usize) -> Self {
        Self::InvalidBlockCount { found }
    }

    pub fn minimizer_failed(message: impl Into<String>) -> Self {
        Self::MinimizerFailed { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::Degenerate { message: message.into() }
    }

    pub fn invalid_cohort(message: impl Into<String>) -> Self {
        Self::InvalidCohort { message: message.into() }
    }
}
