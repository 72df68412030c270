use serde::Serialize;

use super::engine::simulate;
use super::types::Inputs;

#[derive(Debug, Clone, Copy)]
pub struct ExpenseSolveConfig {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for ExpenseSolveConfig {
    fn default() -> Self {
        Self {
            search_min: 0.0,
            search_max: 500_000.0,
            tolerance: 50.0,
            max_iterations: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub sustainable: bool,
    pub out_of_money_age: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSolveResult {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub solved_value: Option<f64>,
    pub ending_total: Option<f64>,
    pub cumulative_tax: Option<f64>,
    pub iterations: Vec<ExpenseSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_max_expenses(
    inputs: &Inputs,
    config: ExpenseSolveConfig,
) -> Result<ExpenseSolveResult, String> {
    validate_config(config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(inputs, config.search_min)?;
    let high_eval = evaluate_candidate(inputs, config.search_max)?;

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if !low_eval.sustainable {
        feasible = false;
        message = "Even the lower expense bound runs out of money.".to_string();
    } else if high_eval.sustainable {
        solved_value = Some(config.search_max);
        converged = true;
        feasible = true;
        message =
            "Upper expense bound is still sustainable; increase search max for a higher level."
                .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(inputs, mid)?;
            iterations.push(ExpenseSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                sustainable: eval.sustainable,
                out_of_money_age: eval.out_of_money_age,
            });

            if eval.sustainable {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable expenses.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let mut ending_total = None;
    let mut cumulative_tax = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(inputs, value)?;
        ending_total = Some(final_eval.ending_total);
        cumulative_tax = Some(final_eval.cumulative_tax);
    }

    Ok(ExpenseSolveResult {
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        solved_value,
        ending_total,
        cumulative_tax,
        iterations,
        converged,
        feasible,
        message,
    })
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    sustainable: bool,
    out_of_money_age: Option<u32>,
    ending_total: f64,
    cumulative_tax: f64,
}

fn evaluate_candidate(base_inputs: &Inputs, candidate_value: f64) -> Result<CandidateEval, String> {
    let mut inputs = base_inputs.clone();
    inputs.base_expenses = candidate_value.max(0.0);
    let result = simulate(&inputs).map_err(|e| e.to_string())?;
    Ok(CandidateEval {
        sustainable: !result.ran_out_of_money(),
        out_of_money_age: result.out_of_money_age,
        ending_total: result.ending_total,
        cumulative_tax: result.cumulative_tax,
    })
}

fn validate_config(config: ExpenseSolveConfig) -> Result<(), String> {
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tables::FilingStatus;
    use crate::core::types::{IncomeCeiling, PersonInputs, WithdrawalStrategy};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_inputs() -> Inputs {
        Inputs {
            filing_status: FilingStatus::Single,
            tax_table: None,
            people: vec![PersonInputs::new(65)],
            lots: Vec::new(),
            cash: 100_000.0,
            base_expenses: 0.0,
            expense_steps: Vec::new(),
            return_rate: 0.0,
            cash_return_rate: 0.0,
            dividend_yield: 0.0,
            years: 4,
            standard_ceiling: IncomeCeiling::StandardDeduction,
            total_ceiling: IncomeCeiling::ZeroCapGainsBracket,
            strategy: WithdrawalStrategy::TaxPenaltyMinimization,
            prefer_457b_first: true,
            other_income: Vec::new(),
            aca: None,
        }
    }

    #[test]
    fn max_expenses_solver_finds_deterministic_solution() {
        let config = ExpenseSolveConfig {
            search_min: 0.0,
            search_max: 100_000.0,
            tolerance: 1.0,
            max_iterations: 40,
        };
        let result = solve_max_expenses(&deterministic_inputs(), config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            25_000.0,
            config.tolerance + 0.5,
        );
        assert!(!result.iterations.is_empty());
    }

    #[test]
    fn reports_infeasible_when_lower_bound_already_fails() {
        let config = ExpenseSolveConfig {
            search_min: 50_000.0,
            search_max: 90_000.0,
            tolerance: 1.0,
            max_iterations: 10,
        };
        let result = solve_max_expenses(&deterministic_inputs(), config).expect("must return");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
    }

    #[test]
    fn returns_upper_bound_when_still_sustainable() {
        let config = ExpenseSolveConfig {
            search_min: 0.0,
            search_max: 10_000.0,
            tolerance: 1.0,
            max_iterations: 10,
        };
        let result = solve_max_expenses(&deterministic_inputs(), config).expect("must return");
        assert_eq!(result.solved_value, Some(10_000.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn rejects_invalid_bounds() {
        let config = ExpenseSolveConfig {
            search_min: 10.0,
            search_max: 5.0,
            ..ExpenseSolveConfig::default()
        };
        let err = solve_max_expenses(&deterministic_inputs(), config).expect_err("must reject");
        assert!(err.contains("search_max"));
    }
}
