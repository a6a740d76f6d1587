use cartwatch_core_types::WatchError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AcquireError {
    #[error("option for {dimension}={value} not present on the page")]
    OptionMissing { dimension: String, value: String },
    #[error("option for {dimension}={value} is disabled")]
    OptionDisabled { dimension: String, value: String },
    #[error("selection of {dimension}={value} was not applied in time")]
    SelectionNotApplied { dimension: String, value: String },
    #[error("dimensions left unselected: {0}")]
    UnselectedDimensions(String),
    #[error("add-to-cart control is disabled")]
    AddControlDisabled,
    #[error("add to cart rejected: {0}")]
    AddRejected(String),
    #[error("no success signal within the confirmation window")]
    NoConfirmation,
    #[error("authentication challenge: {0}")]
    Challenge(String),
}

impl AcquireError {
    pub fn unselected(dimensions: &[String]) -> Self {
        Self::UnselectedDimensions(dimensions.join(", "))
    }
}

impl From<AcquireError> for WatchError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Challenge(detail) => WatchError::challenge(detail),
            other => WatchError::new(other.to_string()),
        }
    }
}
