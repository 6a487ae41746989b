mod engine;
mod error;
mod form;
mod spending;
mod types;

pub use engine::{run_simulation, summarize};
pub use error::{Result, SimulationError};
pub use form::{PolicyKind, PortfolioForm, SimulationForm, SpendingForm};
pub use spending::{apply_ceiling, apply_floor, calc_spending};
pub use types::{
    Allocation, Cycle, HistoricalRecord, PercentBound, PercentOfPortfolioMode, PortfolioState,
    SimulationConfig, SimulationSummary, SpendingConfig, SpendingPolicy, YearState,
};
