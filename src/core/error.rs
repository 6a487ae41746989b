use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("unrecognized spending policy variant: {0}")]
    UnknownPolicy(String),

    #[error("unrecognized percentage of portfolio type: {0}")]
    UnknownPercentageType(String),

    #[error("unrecognized {field} type: {value}")]
    UnknownBoundType { field: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cycle {cycle} has no completed state for year {year}")]
    MissingYear { cycle: usize, year: usize },
}

pub type Result<T> = std::result::Result<T, SimulationError>;
