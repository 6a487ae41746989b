use super::error::{Result, SimulationError};
use super::types::{
    Cycle, PercentBound, PercentOfPortfolioMode, SpendingConfig, SpendingPolicy, YearState,
};

/// Computes the withdrawal for `year_index` of `cycles[cycle_index]`.
///
/// Years before `year_index` must be complete. The year being computed must
/// already carry its portfolio start and cumulative inflation; its spending is
/// ignored.
pub fn calc_spending(
    spending: &SpendingConfig,
    cycles: &[Cycle],
    cycle_index: usize,
    year_index: usize,
) -> Result<f64> {
    let cycle = cycles.get(cycle_index).ok_or(SimulationError::MissingYear {
        cycle: cycle_index,
        year: year_index,
    })?;
    let this_year = year(cycle, cycle_index, year_index)?;

    match spending.policy {
        SpendingPolicy::Fixed => Ok(fixed_spending(spending.initial, this_year, year_index)),
        SpendingPolicy::Variable {
            z_value,
            floor,
            ceiling,
        } => {
            if year_index == 0 {
                return Ok(spending.initial);
            }
            let reference = year(cycle, cycle_index, 0)?;
            let inflation = this_year.inflation_factor();
            let base = variable_spending(
                spending.initial,
                z_value,
                reference.portfolio.start,
                this_year.portfolio.start,
                inflation,
            );
            let floored = apply_floor(base, floor.map(|v| v * inflation));
            // Spending never turns into a deposit.
            Ok(apply_ceiling(floored, ceiling.map(|v| v * inflation)).max(0.0))
        }
        SpendingPolicy::PercentOfPortfolio { percentage, mode } => {
            let raw = this_year.portfolio.start * (percentage / 100.0);
            let (floor, ceiling) = match mode {
                PercentOfPortfolioMode::Constant => return Ok(raw),
                PercentOfPortfolioMode::WithFloorAndCeiling { floor, ceiling } => {
                    (floor, ceiling)
                }
            };
            if year_index == 0 {
                return Ok(raw);
            }
            let last_year = year(cycle, cycle_index, year_index - 1)?;
            let floor_bound = percent_bound(floor, last_year, this_year, cycle_index, year_index)?;
            let ceiling_bound =
                percent_bound(ceiling, last_year, this_year, cycle_index, year_index)?;
            Ok(apply_ceiling(apply_floor(raw, floor_bound), ceiling_bound))
        }
    }
}

fn year(cycle: &Cycle, cycle_index: usize, year_index: usize) -> Result<&YearState> {
    cycle.years.get(year_index).ok_or(SimulationError::MissingYear {
        cycle: cycle_index,
        year: year_index,
    })
}

fn fixed_spending(initial: f64, this_year: &YearState, year_index: usize) -> f64 {
    if year_index == 0 {
        initial
    } else {
        initial * this_year.inflation_factor()
    }
}

/// Unclamped variable spending in nominal terms.
fn variable_spending(
    initial: f64,
    z_value: f64,
    reference_start: f64,
    portfolio_start: f64,
    inflation: f64,
) -> f64 {
    let portfolio_ratio = portfolio_start / (reference_start * inflation);
    let adjustment = (portfolio_ratio - 1.0) * z_value + 1.0;
    initial * adjustment * inflation
}

fn percent_bound(
    bound: PercentBound,
    last_year: &YearState,
    this_year: &YearState,
    cycle_index: usize,
    year_index: usize,
) -> Result<Option<f64>> {
    match bound {
        PercentBound::None => Ok(None),
        PercentBound::PercentageOfPortfolio(pct) => Ok(Some(
            last_year.portfolio.start * (pct / 100.0) * this_year.inflation_factor(),
        )),
        PercentBound::PercentageOfPreviousYear(pct) => {
            let last_spending = last_year.spending.ok_or(SimulationError::MissingYear {
                cycle: cycle_index,
                year: year_index - 1,
            })?;
            Ok(Some(last_spending * (pct / 100.0)))
        }
    }
}

pub fn apply_floor(value: f64, floor: Option<f64>) -> f64 {
    match floor {
        Some(floor) => value.max(floor),
        None => value,
    }
}

pub fn apply_ceiling(value: f64, ceiling: Option<f64>) -> f64 {
    match ceiling {
        Some(ceiling) => value.min(ceiling),
        None => value,
    }
}
