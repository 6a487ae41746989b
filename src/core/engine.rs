use tracing::{debug, info};

use super::error::Result;
use super::spending::calc_spending;
use super::types::{Cycle, HistoricalRecord, SimulationConfig, SimulationSummary, YearState};

/// Runs one cycle per full-length window of `dataset`, in ascending start order.
///
/// A dataset shorter than the retirement window yields no cycles.
pub fn run_simulation(
    config: &SimulationConfig,
    dataset: &[HistoricalRecord],
) -> Result<Vec<Cycle>> {
    config.validate()?;

    let window = config.window_length();
    if dataset.len() < window {
        info!(
            records = dataset.len(),
            window, "dataset shorter than retirement window, no cycles to run"
        );
        return Ok(Vec::new());
    }

    let cycle_count = dataset.len() - window + 1;
    let mut cycles: Vec<Cycle> = Vec::with_capacity(cycle_count);
    for start in 0..cycle_count {
        cycles.push(Cycle {
            start_offset: start,
            records: dataset[start..start + window].to_vec(),
            years: Vec::with_capacity(window),
        });
        let cycle_index = cycles.len() - 1;
        for year_index in 0..window {
            simulate_year(config, &mut cycles, cycle_index, year_index)?;
        }
        debug!(
            cycle = cycle_index,
            start = cycles[cycle_index].start_date().unwrap_or_default(),
            terminal = cycles[cycle_index].terminal_portfolio(),
            "cycle complete"
        );
    }

    info!(cycles = cycles.len(), window, "simulation complete");
    Ok(cycles)
}

fn simulate_year(
    config: &SimulationConfig,
    cycles: &mut [Cycle],
    cycle_index: usize,
    year_index: usize,
) -> Result<()> {
    let year = {
        let cycle = &cycles[cycle_index];
        let date = cycle.records[year_index].date.clone();
        match year_index.checked_sub(1).map(|i| (&cycle.years[i], &cycle.records[i])) {
            None => YearState::new(date, config.initial_portfolio).with_inflation(1.0),
            Some((last_year, last_record)) => {
                YearState::new(date, last_year.portfolio.end)
                    .with_inflation(last_year.inflation_factor() * (1.0 + last_record.inflation))
            }
        }
    };
    cycles[cycle_index].years.push(year);

    let spending = calc_spending(&config.spending, cycles, cycle_index, year_index)?;

    let cycle = &mut cycles[cycle_index];
    let period_return = config.period_return(&cycle.records[year_index]);
    let year = &mut cycle.years[year_index];
    year.spending = Some(spending);
    year.portfolio.end = ((year.portfolio.start - spending) * (1.0 + period_return)).max(0.0);
    Ok(())
}

pub fn summarize(cycles: &[Cycle]) -> SimulationSummary {
    if cycles.is_empty() {
        return SimulationSummary::default();
    }

    let success_count = cycles.iter().filter(|c| !c.failed()).count();
    let mut terminal = cycles
        .iter()
        .map(Cycle::terminal_portfolio)
        .collect::<Vec<_>>();
    let mut min_spending = cycles.iter().map(Cycle::min_spending).collect::<Vec<_>>();
    let worst_cycle_start = cycles
        .iter()
        .min_by(|a, b| a.terminal_portfolio().total_cmp(&b.terminal_portfolio()))
        .and_then(|c| c.start_date())
        .map(str::to_string);

    SimulationSummary {
        cycle_count: cycles.len(),
        success_count,
        success_rate: success_count as f64 / cycles.len() as f64,
        median_terminal_portfolio: percentile(&mut terminal, 50.0),
        p10_terminal_portfolio: percentile(&mut terminal, 10.0),
        p90_terminal_portfolio: percentile(&mut terminal, 90.0),
        median_min_spending: percentile(&mut min_spending, 50.0),
        worst_cycle_start,
    }
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
