use serde::{Deserialize, Serialize};

use super::tables::{AcaRegion, FilingStatus, TaxRateTable};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalStrategy {
    TaxPenaltyMinimization,
    Traditional,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncomeCeiling {
    StandardDeduction,
    OrdinaryBracketTop(usize),
    ZeroCapGainsBracket,
    SpecifiedIncome(f64),
}

impl IncomeCeiling {
    pub fn resolve(self, table: &TaxRateTable) -> f64 {
        match self {
            IncomeCeiling::StandardDeduction => table.standard_deduction,
            IncomeCeiling::OrdinaryBracketTop(n) => {
                let last = table.bracket_minimums.len().saturating_sub(1);
                let top = table
                    .bracket_minimums
                    .get((n + 1).min(last))
                    .copied()
                    .unwrap_or(0.0);
                table.standard_deduction + top
            }
            IncomeCeiling::ZeroCapGainsBracket => {
                table.standard_deduction + table.ltcg_bracket_minimums[1]
            }
            IncomeCeiling::SpecifiedIncome(amount) => amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonInputs {
    pub age: u32,
    pub pretax: f64,
    pub pretax_457b: f64,
    pub roth: f64,
    pub roth_contributions: f64,
    pub rmd_start_age: u32,
    pub ss_start_age: u32,
    pub ss_annual: f64,
}

impl PersonInputs {
    pub fn new(age: u32) -> Self {
        Self {
            age,
            pretax: 0.0,
            pretax_457b: 0.0,
            roth: 0.0,
            roth_contributions: 0.0,
            rmd_start_age: 73,
            ss_start_age: 67,
            ss_annual: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotInputs {
    pub balance: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStep {
    pub age: u32,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStream {
    pub amount: f64,
    pub owner: usize,
    pub start_age: u32,
    #[serde(default)]
    pub end_age: Option<u32>,
}

impl IncomeStream {
    pub fn is_active(&self, owner_age: u32) -> bool {
        owner_age >= self.start_age && self.end_age.is_none_or(|end| owner_age <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcaConfig {
    pub benchmark_premium: f64,
    pub household_size: u32,
    pub region: AcaRegion,
    pub end_age: u32,
}

#[derive(Debug, Clone)]
pub struct Inputs {
    pub filing_status: FilingStatus,
    pub tax_table: Option<TaxRateTable>,
    pub people: Vec<PersonInputs>,
    pub lots: Vec<LotInputs>,
    pub cash: f64,
    pub base_expenses: f64,
    pub expense_steps: Vec<ExpenseStep>,
    pub return_rate: f64,
    pub cash_return_rate: f64,
    pub dividend_yield: f64,
    pub years: u32,
    pub standard_ceiling: IncomeCeiling,
    pub total_ceiling: IncomeCeiling,
    pub strategy: WithdrawalStrategy,
    pub prefer_457b_first: bool,
    pub other_income: Vec<IncomeStream>,
    pub aca: Option<AcaConfig>,
}

impl Inputs {
    pub fn expenses_at(&self, primary_age: u32) -> f64 {
        let steps: f64 = self
            .expense_steps
            .iter()
            .filter(|step| primary_age >= step.age)
            .map(|step| step.change)
            .sum();
        (self.base_expenses + steps).max(0.0)
    }
}

// `standard_income` includes taxable Social Security.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRow {
    pub year: u32,
    pub age: u32,
    pub ages: Vec<u32>,
    pub expenses: f64,
    pub cash_needed: f64,
    pub cash_generated: f64,
    pub standard_income: f64,
    pub ltcg_income: f64,
    pub social_security: f64,
    pub taxable_social_security: f64,
    pub max_standard_income: f64,
    pub max_total_income: f64,
    pub standard_tax: f64,
    pub ltcg_tax: f64,
    pub total_tax: f64,
    pub penalties: f64,
    pub rmd_total: f64,
    pub roth_converted: f64,
    pub aca_adjustment: f64,
    pub tax_owed_carried_in: f64,
    pub refund_reinvested: f64,
    pub excess_reinvested: f64,
    pub end_pretax: f64,
    pub end_pretax_457b: f64,
    pub end_roth: f64,
    pub end_roth_contributions: f64,
    pub end_taxable: f64,
    pub end_taxable_gain: f64,
    pub end_cash: f64,
    pub end_total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub strategy: WithdrawalStrategy,
    pub years: Vec<YearRow>,
    pub out_of_money_age: Option<u32>,
    pub cumulative_tax: f64,
    pub cumulative_penalties: f64,
    pub ending_total: f64,
}

impl SimulationResult {
    pub fn ran_out_of_money(&self) -> bool {
        self.out_of_money_age.is_some()
    }
}
