use serde::{Deserialize, Serialize};

/// One period of historical market data. Figures are fractions, so a 7% equity
/// return is `0.07`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRecord {
    pub date: String,
    pub equities: f64,
    pub bonds: f64,
    #[serde(default)]
    pub cash: f64,
    pub inflation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub equities: f64,
    pub bonds: f64,
    pub cash: f64,
}

impl Default for Allocation {
    fn default() -> Self {
        Self {
            equities: 0.75,
            bonds: 0.25,
            cash: 0.0,
        }
    }
}

impl Allocation {
    pub fn total(self) -> f64 {
        self.equities + self.bonds + self.cash
    }

    pub fn weighted_return(self, record: &HistoricalRecord) -> f64 {
        self.equities * record.equities + self.bonds * record.bonds + self.cash * record.cash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PercentBound {
    None,
    /// Percentage of last year's portfolio start, inflation adjusted.
    PercentageOfPortfolio(f64),
    /// Percentage of last year's spending.
    PercentageOfPreviousYear(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PercentOfPortfolioMode {
    Constant,
    WithFloorAndCeiling {
        floor: PercentBound,
        ceiling: PercentBound,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SpendingPolicy {
    /// Initial spending held constant in real terms.
    Fixed,
    /// Initial spending nudged by `z_value` times the real portfolio performance
    /// since retirement start. Floor and ceiling are real-terms amounts.
    #[serde(rename_all = "camelCase")]
    Variable {
        z_value: f64,
        floor: Option<f64>,
        ceiling: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    PercentOfPortfolio {
        percentage: f64,
        mode: PercentOfPortfolioMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingConfig {
    pub initial: f64,
    pub policy: SpendingPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub retirement_start_year: u32,
    pub retirement_end_year: u32,
    pub initial_portfolio: f64,
    pub allocation: Allocation,
    /// Annual fees as a fraction of the portfolio.
    pub fees: f64,
    pub spending: SpendingConfig,
}

impl SimulationConfig {
    pub fn window_length(&self) -> usize {
        self.retirement_end_year
            .saturating_sub(self.retirement_start_year) as usize
            + 1
    }

    pub fn period_return(&self, record: &HistoricalRecord) -> f64 {
        self.allocation.weighted_return(record) - self.fees
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioState {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearState {
    pub date: String,
    pub portfolio: PortfolioState,
    /// `None` only while the engine is still computing this year.
    pub spending: Option<f64>,
    pub cumulative_inflation: Option<f64>,
}

impl YearState {
    pub fn new(date: impl Into<String>, portfolio_start: f64) -> Self {
        Self {
            date: date.into(),
            portfolio: PortfolioState {
                start: portfolio_start,
                end: 0.0,
            },
            spending: None,
            cumulative_inflation: None,
        }
    }

    pub fn with_inflation(mut self, cumulative_inflation: f64) -> Self {
        self.cumulative_inflation = Some(cumulative_inflation);
        self
    }

    #[cfg(test)]
    pub fn with_spending(mut self, spending: f64) -> Self {
        self.spending = Some(spending);
        self
    }

    /// Cumulative inflation, treating an unrecorded value as no inflation.
    pub fn inflation_factor(&self) -> f64 {
        self.cumulative_inflation.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    pub start_offset: usize,
    pub records: Vec<HistoricalRecord>,
    pub years: Vec<YearState>,
}

impl Cycle {
    pub fn start_date(&self) -> Option<&str> {
        self.years.first().map(|y| y.date.as_str())
    }

    pub fn terminal_portfolio(&self) -> f64 {
        self.years.last().map(|y| y.portfolio.end).unwrap_or(0.0)
    }

    pub fn min_spending(&self) -> f64 {
        self.years
            .iter()
            .filter_map(|y| y.spending)
            .min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0.0)
    }

    /// A cycle fails once the portfolio is exhausted while spending is still owed.
    pub fn failed(&self) -> bool {
        self.years
            .iter()
            .any(|y| y.portfolio.end <= 0.0 && y.spending.unwrap_or(0.0) > 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub cycle_count: usize,
    pub success_count: usize,
    pub success_rate: f64,
    pub median_terminal_portfolio: f64,
    pub p10_terminal_portfolio: f64,
    pub p90_terminal_portfolio: f64,
    pub median_min_spending: f64,
    pub worst_cycle_start: Option<String>,
}
