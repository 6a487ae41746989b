use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, SimulationError};
use super::types::{
    Allocation, PercentBound, PercentOfPortfolioMode, SimulationConfig, SpendingConfig,
    SpendingPolicy,
};

const DEFAULT_PERCENT_EQUITIES: f64 = 75.0;
const DEFAULT_PERCENT_BONDS: f64 = 25.0;
const DEFAULT_PERCENT_FEES: f64 = 0.18;

/// Simulation parameters as the web form submits them: policy variants are
/// string tags and most numbers are optional percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationForm {
    pub retirement_start_year: Option<u32>,
    pub retirement_end_year: Option<u32>,
    pub portfolio: PortfolioForm,
    pub spending: SpendingForm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortfolioForm {
    pub initial: Option<f64>,
    pub percent_equities: Option<f64>,
    pub percent_bonds: Option<f64>,
    pub percent_cash: Option<f64>,
    pub percent_fees: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpendingForm {
    pub method: Option<String>,
    pub initial: Option<f64>,
    pub variable_spending_z_value: Option<f64>,
    pub floor: Option<String>,
    pub floor_value: Option<f64>,
    pub ceiling: Option<String>,
    pub ceiling_value: Option<f64>,
    pub percentage_of_portfolio_percentage: Option<f64>,
    pub percentage_of_portfolio_type: Option<String>,
    pub percentage_of_portfolio_floor_type: Option<String>,
    pub percentage_of_portfolio_floor_percentage: Option<f64>,
    pub percentage_of_portfolio_ceiling_type: Option<String>,
    pub percentage_of_portfolio_ceiling_percentage: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PolicyKind {
    InflationAdjusted,
    VariableSpending,
    PercentOfPortfolio,
}

impl FromStr for PolicyKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inflationAdjusted" | "fixed" => Ok(Self::InflationAdjusted),
            "variableSpending" => Ok(Self::VariableSpending),
            "percentOfPortfolio" => Ok(Self::PercentOfPortfolio),
            other => Err(SimulationError::UnknownPolicy(other.to_string())),
        }
    }
}

impl SimulationForm {
    pub fn into_config(self) -> Result<SimulationConfig> {
        let retirement_start_year = self
            .retirement_start_year
            .ok_or_else(|| missing("retirementStartYear"))?;
        let retirement_end_year = self
            .retirement_end_year
            .ok_or_else(|| missing("retirementEndYear"))?;
        let initial_portfolio = self
            .portfolio
            .initial
            .ok_or_else(|| missing("portfolio.initial"))?;

        let allocation = Allocation {
            equities: self
                .portfolio
                .percent_equities
                .unwrap_or(DEFAULT_PERCENT_EQUITIES)
                / 100.0,
            bonds: self.portfolio.percent_bonds.unwrap_or(DEFAULT_PERCENT_BONDS) / 100.0,
            cash: self.portfolio.percent_cash.unwrap_or(0.0) / 100.0,
        };

        let config = SimulationConfig {
            retirement_start_year,
            retirement_end_year,
            initial_portfolio,
            allocation,
            fees: self.portfolio.percent_fees.unwrap_or(DEFAULT_PERCENT_FEES) / 100.0,
            spending: self.spending.into_config()?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl SpendingForm {
    pub fn into_config(self) -> Result<SpendingConfig> {
        let kind = self
            .method
            .as_deref()
            .ok_or_else(|| missing("spending.method"))?
            .parse::<PolicyKind>()?;

        let policy = match kind {
            PolicyKind::InflationAdjusted => SpendingPolicy::Fixed,
            PolicyKind::VariableSpending => SpendingPolicy::Variable {
                z_value: self
                    .variable_spending_z_value
                    .ok_or_else(|| missing("spending.variableSpendingZValue"))?,
                floor: defined_value("floor", self.floor.as_deref(), self.floor_value)?,
                ceiling: defined_value("ceiling", self.ceiling.as_deref(), self.ceiling_value)?,
            },
            PolicyKind::PercentOfPortfolio => SpendingPolicy::PercentOfPortfolio {
                percentage: self
                    .percentage_of_portfolio_percentage
                    .ok_or_else(|| missing("spending.percentageOfPortfolioPercentage"))?,
                mode: self.percent_mode()?,
            },
        };

        let initial = match (kind, self.initial) {
            (_, Some(initial)) => initial,
            (PolicyKind::PercentOfPortfolio, None) => 0.0,
            (_, None) => return Err(missing("spending.initial")),
        };

        Ok(SpendingConfig { initial, policy })
    }

    fn percent_mode(&self) -> Result<PercentOfPortfolioMode> {
        match self.percentage_of_portfolio_type.as_deref() {
            None | Some("constant") => Ok(PercentOfPortfolioMode::Constant),
            Some("withFloorAndCeiling") => Ok(PercentOfPortfolioMode::WithFloorAndCeiling {
                floor: percent_bound(
                    "percentageOfPortfolioFloor",
                    self.percentage_of_portfolio_floor_type.as_deref(),
                    self.percentage_of_portfolio_floor_percentage,
                )?,
                ceiling: percent_bound(
                    "percentageOfPortfolioCeiling",
                    self.percentage_of_portfolio_ceiling_type.as_deref(),
                    self.percentage_of_portfolio_ceiling_percentage,
                )?,
            }),
            Some(other) => Err(SimulationError::UnknownPercentageType(other.to_string())),
        }
    }
}

/// A `definedValue` bound without a value means no bound.
fn defined_value(
    field: &'static str,
    kind: Option<&str>,
    value: Option<f64>,
) -> Result<Option<f64>> {
    match kind {
        None | Some("none") => Ok(None),
        Some("definedValue") => Ok(value),
        Some(other) => Err(SimulationError::UnknownBoundType {
            field,
            value: other.to_string(),
        }),
    }
}

fn percent_bound(
    field: &'static str,
    kind: Option<&str>,
    pct: Option<f64>,
) -> Result<PercentBound> {
    let bound: fn(f64) -> PercentBound = match kind {
        None | Some("none") => return Ok(PercentBound::None),
        Some("percentageOfPortfolio") => PercentBound::PercentageOfPortfolio,
        Some("percentageOfPreviousYear") => PercentBound::PercentageOfPreviousYear,
        Some(other) => {
            return Err(SimulationError::UnknownBoundType {
                field,
                value: other.to_string(),
            });
        }
    };
    Ok(pct.map(bound).unwrap_or(PercentBound::None))
}

fn missing(field: &str) -> SimulationError {
    SimulationError::InvalidConfig(format!("{field} is required"))
}

impl SimulationConfig {
    /// Checks the numeric parameters once, before any cycle is built.
    pub fn validate(&self) -> Result<()> {
        use SimulationError::InvalidConfig;

        if self.retirement_end_year < self.retirement_start_year {
            return Err(InvalidConfig(
                "retirementEndYear must be >= retirementStartYear".to_string(),
            ));
        }
        if !self.initial_portfolio.is_finite() || self.initial_portfolio <= 0.0 {
            return Err(InvalidConfig("initial portfolio must be > 0".to_string()));
        }
        if !self.spending.initial.is_finite() || self.spending.initial < 0.0 {
            return Err(InvalidConfig("initial spending must be >= 0".to_string()));
        }
        if !self.fees.is_finite() || !(0.0..1.0).contains(&self.fees) {
            return Err(InvalidConfig(
                "fees must be between 0 and 100 percent".to_string(),
            ));
        }
        if (self.allocation.total() - 1.0).abs() > 1e-6 {
            return Err(InvalidConfig(format!(
                "allocation must sum to 100 percent, got {}",
                self.allocation.total() * 100.0
            )));
        }

        match self.spending.policy {
            SpendingPolicy::Fixed => {}
            SpendingPolicy::Variable {
                z_value,
                floor,
                ceiling,
            } => {
                if !z_value.is_finite() || z_value < 0.0 {
                    return Err(InvalidConfig(
                        "variableSpendingZValue must be >= 0".to_string(),
                    ));
                }
                if floor.is_some_and(|v| !v.is_finite()) || ceiling.is_some_and(|v| !v.is_finite())
                {
                    return Err(InvalidConfig(
                        "floor and ceiling values must be finite".to_string(),
                    ));
                }
            }
            SpendingPolicy::PercentOfPortfolio { percentage, mode } => {
                if !percentage.is_finite() || percentage < 0.0 {
                    return Err(InvalidConfig(
                        "percentageOfPortfolioPercentage must be >= 0".to_string(),
                    ));
                }
                if let PercentOfPortfolioMode::WithFloorAndCeiling { floor, ceiling } = mode {
                    for bound in [floor, ceiling] {
                        let pct = match bound {
                            PercentBound::None => continue,
                            PercentBound::PercentageOfPortfolio(pct)
                            | PercentBound::PercentageOfPreviousYear(pct) => pct,
                        };
                        if !pct.is_finite() || pct < 0.0 {
                            return Err(InvalidConfig(
                                "floor and ceiling percentages must be >= 0".to_string(),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
