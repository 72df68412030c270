use super::accounts::{
    Accounts, LotOrder, LotTarget, Mode, PreTaxRoute, WithdrawalOutcome, penalty_free_roth_available,
    withdraw_from_457b, withdraw_from_lots, withdraw_from_pretax, withdraw_roth_penalty_free,
    withdraw_roth_with_penalty,
};
use super::tables::{FilingStatus, TaxRateTable};
use super::targeting::{IncomeTargets, max_additional_income};
use super::tax::{TaxBreakdown, compute_taxes, taxable_social_security};

pub const SHORTFALL_EPSILON: f64 = 0.01;
pub const OPTIMIZER_STEP: f64 = 100.0;
// Shortfalls beyond OPTIMIZER_STEP * this many steps use proportionally larger steps.
const OPTIMIZER_STEPS_PER_YEAR: f64 = 10_000.0;
const MAX_SOURCE_PASSES: usize = 64;

// `standard_income` excludes taxable Social Security.
#[derive(Debug, Clone, Default)]
pub struct YearState {
    pub standard_income: f64,
    pub ltcg_income: f64,
    pub ss_total: f64,
    pub ss_taxable: f64,
    pub max_standard_income: f64,
    pub max_total_income: f64,
    pub cash_generated: f64,
    pub cash_needed: f64,
    pub tax: TaxBreakdown,
    pub penalties: f64,
    pub rmd_total: f64,
    pub roth_converted: f64,
}

impl YearState {
    pub fn new(cash_needed: f64) -> Self {
        Self {
            cash_needed,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, outcome: WithdrawalOutcome) {
        self.cash_generated += outcome.cash;
        self.standard_income += outcome.standard_income;
        self.ltcg_income += outcome.ltcg_income;
        self.penalties += outcome.penalty;
        self.roth_converted += outcome.converted;
    }

    pub fn refresh_tax(&mut self, table: &TaxRateTable, status: FilingStatus) {
        self.ss_taxable = taxable_social_security(
            self.standard_income + self.ltcg_income,
            self.ss_total,
            status,
        );
        self.tax = compute_taxes(self.standard_income + self.ss_taxable, self.ltcg_income, table);
    }

    pub fn liability(&self) -> f64 {
        self.tax.total + self.penalties
    }

    pub fn total_cash_needed(&self) -> f64 {
        self.cash_needed + self.liability()
    }

    pub fn shortfall(&self) -> f64 {
        (self.total_cash_needed() - self.cash_generated).max(0.0)
    }

    pub fn excess_cash(&self) -> f64 {
        (self.cash_generated - self.total_cash_needed()).max(0.0)
    }

    pub fn reported_standard_income(&self) -> f64 {
        self.standard_income + self.ss_taxable
    }
}

pub fn run_goal_directed_phase(
    accounts: &mut Accounts,
    state: &mut YearState,
    targets: &IncomeTargets,
    prefer_457b_first: bool,
    status: FilingStatus,
) {
    state.max_standard_income = targets.max_standard_income;
    state.max_total_income = targets.max_total_income;

    let mut room = targets.adjustable_standard;
    let kinds = if prefer_457b_first {
        [StandardSource::Pretax457b, StandardSource::PreTax]
    } else {
        [StandardSource::PreTax, StandardSource::Pretax457b]
    };
    for kind in kinds {
        for person in &mut accounts.people {
            if room <= SHORTFALL_EPSILON {
                break;
            }
            let outcome = match kind {
                StandardSource::Pretax457b => withdraw_from_457b(person, room, Mode::Execute),
                StandardSource::PreTax => {
                    withdraw_from_pretax(person, room, PreTaxRoute::ConvertIfEarly, Mode::Execute)
                }
            };
            room -= outcome.standard_income;
            state.apply(outcome);
        }
    }

    let non_ss_income = state.standard_income + state.ltcg_income;
    let gain_room = max_additional_income(
        non_ss_income,
        non_ss_income,
        state.ss_total,
        state.max_total_income,
        status,
    );
    if gain_room > SHORTFALL_EPSILON {
        let outcome = withdraw_from_lots(
            &mut accounts.lots,
            LotTarget::Gain(gain_room),
            LotOrder::HighestGainFirst,
            Mode::Execute,
        );
        state.apply(outcome);
    }

    log::debug!(
        "goal phase: standard {:.2}, ltcg {:.2}, converted {:.2}, cash {:.2}",
        state.standard_income,
        state.ltcg_income,
        state.roth_converted,
        state.cash_generated
    );
}

#[derive(Copy, Clone)]
enum StandardSource {
    Pretax457b,
    PreTax,
}

pub fn run_penalty_free_phase(accounts: &mut Accounts, state: &mut YearState) {
    for person in &mut accounts.people {
        let shortfall = state.shortfall();
        if shortfall <= SHORTFALL_EPSILON {
            return;
        }
        if penalty_free_roth_available(person) > 0.0 {
            let outcome = withdraw_roth_penalty_free(person, shortfall, Mode::Execute);
            state.apply(outcome);
        }
    }

    let from_cash = state.shortfall().min(accounts.cash);
    if from_cash > 0.0 {
        accounts.cash -= from_cash;
        state.cash_generated += from_cash;
    }
}

// Declaration order is the tie-break order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Source {
    Pretax457b(usize),
    PreTax(usize),
    TaxableLots,
    Roth(usize),
}

fn optimizer_sources(people: usize) -> Vec<Source> {
    let mut sources: Vec<Source> = (0..people).map(Source::Pretax457b).collect();
    sources.extend((0..people).map(Source::PreTax));
    sources.push(Source::TaxableLots);
    sources.extend((0..people).map(Source::Roth));
    sources
}

fn traditional_sources(people: usize) -> Vec<Source> {
    let mut sources = vec![Source::TaxableLots];
    sources.extend((0..people).map(Source::Pretax457b));
    sources.extend((0..people).map(Source::PreTax));
    sources.extend((0..people).map(Source::Roth));
    sources
}

fn available(accounts: &Accounts, source: Source) -> f64 {
    match source {
        Source::Pretax457b(i) => accounts.people[i].pretax_457b,
        Source::PreTax(i) => accounts.people[i].pretax,
        Source::TaxableLots => accounts.eligible_lots_balance(),
        Source::Roth(i) => accounts.people[i].roth.balance,
    }
}

fn draw(accounts: &mut Accounts, source: Source, amount: f64, mode: Mode) -> WithdrawalOutcome {
    match source {
        Source::Pretax457b(i) => withdraw_from_457b(&mut accounts.people[i], amount, mode),
        Source::PreTax(i) => {
            withdraw_from_pretax(&mut accounts.people[i], amount, PreTaxRoute::CashOut, mode)
        }
        Source::TaxableLots => withdraw_from_lots(
            &mut accounts.lots,
            LotTarget::Cash(amount),
            LotOrder::LowestGainFirst,
            mode,
        ),
        Source::Roth(i) => withdraw_roth_with_penalty(&mut accounts.people[i], amount, mode),
    }
}

fn marginal_cost(
    accounts: &mut Accounts,
    state: &YearState,
    source: Source,
    step: f64,
    table: &TaxRateTable,
    status: FilingStatus,
) -> Option<f64> {
    let probe = draw(accounts, source, step, Mode::DryRun);
    if probe.cash <= 0.0 {
        return None;
    }
    let mut trial = state.clone();
    trial.apply(probe);
    trial.refresh_tax(table, status);
    Some((trial.liability() - state.liability()) / probe.cash)
}

pub fn run_marginal_cost_optimizer(
    accounts: &mut Accounts,
    state: &mut YearState,
    table: &TaxRateTable,
    status: FilingStatus,
) -> bool {
    let sources = optimizer_sources(accounts.people.len());

    // every step draws a positive amount from a live source, so this ends
    loop {
        let shortfall = state.shortfall();
        if shortfall <= SHORTFALL_EPSILON {
            return true;
        }

        let live: Vec<Source> = sources
            .iter()
            .copied()
            .filter(|s| available(accounts, *s) > SHORTFALL_EPSILON)
            .collect();
        let step = match live.as_slice() {
            [] => return false,
            [only] => shortfall.min(available(accounts, *only)),
            _ => (shortfall / OPTIMIZER_STEPS_PER_YEAR)
                .max(OPTIMIZER_STEP)
                .min(shortfall),
        };

        let mut best: Option<(Source, f64)> = None;
        for source in live {
            let Some(cost) = marginal_cost(accounts, state, source, step, table, status) else {
                continue;
            };
            if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                best = Some((source, cost));
            }
        }
        let Some((source, _)) = best else {
            return false;
        };

        let outcome = draw(accounts, source, step, Mode::Execute);
        state.apply(outcome);
        state.refresh_tax(table, status);
    }
}

pub fn run_traditional_phase(
    accounts: &mut Accounts,
    state: &mut YearState,
    table: &TaxRateTable,
    status: FilingStatus,
) -> bool {
    let from_cash = state.shortfall().min(accounts.cash);
    if from_cash > 0.0 {
        accounts.cash -= from_cash;
        state.cash_generated += from_cash;
    }

    for source in traditional_sources(accounts.people.len()) {
        for _ in 0..MAX_SOURCE_PASSES {
            let shortfall = state.shortfall();
            if shortfall <= SHORTFALL_EPSILON {
                return true;
            }
            let outcome = draw(accounts, source, shortfall, Mode::Execute);
            if outcome.cash <= 0.0 {
                break;
            }
            state.apply(outcome);
            state.refresh_tax(table, status);
        }
    }

    state.shortfall() <= SHORTFALL_EPSILON
}
