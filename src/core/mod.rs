mod accounts;
mod engine;
mod error;
mod solver;
mod tables;
mod targeting;
mod tax;
mod types;
mod withdrawal;

pub use accounts::{
    Accounts, ConversionRecord, LotOrder, LotTarget, Mode, Person, PreTaxRoute, RothAccount,
    TaxableLot, WithdrawalOutcome,
};
pub use engine::{SimulationContext, run_scenarios, simulate};
pub use error::ConfigError;
pub use solver::{ExpenseSolveConfig, ExpenseSolveIteration, ExpenseSolveResult, solve_max_expenses};
pub use tables::{AcaRegion, AcaTables, FilingStatus, RmdTable, TaxRateTable};
pub use targeting::{IncomeTargets, max_additional_income, resolve_income_targets};
pub use tax::{
    AcaSubsidy, RequiredDistribution, TaxBreakdown, aca_subsidy, compute_taxes,
    required_minimum_distribution, taxable_social_security, taxable_social_security_worksheet,
};
pub use types::{
    AcaConfig, ExpenseStep, IncomeCeiling, IncomeStream, Inputs, LotInputs, PersonInputs,
    SimulationResult, WithdrawalStrategy, YearRow,
};
pub use withdrawal::{Source, YearState};
