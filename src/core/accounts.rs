use std::ops::AddAssign;

use super::error::ConfigError;
use super::types::Inputs;

pub const EARLY_WITHDRAWAL_PENALTY: f64 = 0.10;
// Stand-in for 59.5: ages are whole years.
pub const PENALTY_FREE_AGE: u32 = 60;
pub const CONVERSION_SEASONING_YEARS: u32 = 5;

const BALANCE_EPSILON: f64 = 1e-9;
const CONSISTENCY_EPSILON: f64 = 0.01;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Execute,
    DryRun,
}

impl Mode {
    fn executes(self) -> bool {
        self == Mode::Execute
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WithdrawalOutcome {
    pub cash: f64,
    pub standard_income: f64,
    pub ltcg_income: f64,
    pub penalty: f64,
    pub converted: f64,
}

impl AddAssign for WithdrawalOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.cash += rhs.cash;
        self.standard_income += rhs.standard_income;
        self.ltcg_income += rhs.ltcg_income;
        self.penalty += rhs.penalty;
        self.converted += rhs.converted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxableLot {
    pub balance: f64,
    pub gain: f64,
    // bought this year; selling would realize a short-term gain
    pub purchased_this_year: bool,
}

impl TaxableLot {
    pub fn gain_ratio(&self) -> f64 {
        if self.balance <= BALANCE_EPSILON {
            0.0
        } else {
            self.gain / self.balance
        }
    }

    fn is_eligible(&self) -> bool {
        !self.purchased_this_year && self.balance > BALANCE_EPSILON
    }

    fn sell(&mut self, amount: f64) -> f64 {
        let amount = amount.clamp(0.0, self.balance);
        let realized = amount * self.gain_ratio();
        self.balance -= amount;
        self.gain -= realized;
        if self.balance <= BALANCE_EPSILON {
            self.balance = 0.0;
            self.gain = 0.0;
        }
        realized
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionRecord {
    pub remaining: f64,
    pub age_at_conversion: u32,
}

impl ConversionRecord {
    pub fn is_seasoned(&self, owner_age: u32) -> bool {
        owner_age.saturating_sub(self.age_at_conversion) >= CONVERSION_SEASONING_YEARS
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RothAccount {
    pub balance: f64,
    pub contributions: f64,
    pub conversions: Vec<ConversionRecord>,
}

impl RothAccount {
    pub fn conversion_total(&self) -> f64 {
        self.conversions.iter().map(|c| c.remaining).sum()
    }

    pub fn earnings(&self) -> f64 {
        (self.balance - self.contributions - self.conversion_total()).max(0.0)
    }

    // Losses shrink contributions and conversions pro rata so the tracked
    // basis never exceeds the balance.
    fn fit_basis_to_balance(&mut self) {
        let tracked = self.contributions + self.conversion_total();
        if tracked <= self.balance || tracked <= BALANCE_EPSILON {
            return;
        }
        let scale = self.balance / tracked;
        self.contributions *= scale;
        for record in &mut self.conversions {
            record.remaining *= scale;
        }
        self.conversions.retain(|c| c.remaining > BALANCE_EPSILON);
    }

    fn take_contributions(&mut self, amount: f64) -> f64 {
        let x = amount.min(self.contributions).min(self.balance).max(0.0);
        self.contributions -= x;
        self.balance -= x;
        x
    }

    fn take_conversions(&mut self, amount: f64, owner_age: u32, seasoned: bool) -> f64 {
        let amount = amount.min(self.balance);
        let mut taken = 0.0;
        for record in self
            .conversions
            .iter_mut()
            .filter(|c| c.is_seasoned(owner_age) == seasoned)
        {
            if taken >= amount {
                break;
            }
            let x = (amount - taken).min(record.remaining);
            record.remaining -= x;
            taken += x;
        }
        self.conversions.retain(|c| c.remaining > BALANCE_EPSILON);
        self.balance -= taken;
        taken
    }

    fn take_earnings(&mut self, amount: f64) -> f64 {
        let x = amount.min(self.earnings()).max(0.0);
        self.balance -= x;
        x
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub age: u32,
    pub pretax: f64,
    pub pretax_457b: f64,
    pub roth: RothAccount,
}

impl Person {
    pub fn penalty_free(&self) -> bool {
        self.age >= PENALTY_FREE_AGE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accounts {
    pub people: Vec<Person>,
    // never shrinks; depleted lots stay at zero
    pub lots: Vec<TaxableLot>,
    pub cash: f64,
}

impl Accounts {
    pub fn from_inputs(inputs: &Inputs) -> Result<Self, ConfigError> {
        let people = inputs
            .people
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if p.roth_contributions > p.roth {
                    return Err(ConfigError::RothContributionsExceedBalance {
                        person: i,
                        contributions: p.roth_contributions,
                        balance: p.roth,
                    });
                }
                Ok(Person {
                    age: p.age,
                    pretax: p.pretax,
                    pretax_457b: p.pretax_457b,
                    roth: RothAccount {
                        balance: p.roth,
                        contributions: p.roth_contributions,
                        conversions: Vec::new(),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let lots = inputs
            .lots
            .iter()
            .enumerate()
            .map(|(index, lot)| {
                if lot.gain > lot.balance {
                    return Err(ConfigError::LotGainExceedsBalance {
                        index,
                        gain: lot.gain,
                        balance: lot.balance,
                    });
                }
                Ok(TaxableLot {
                    balance: lot.balance,
                    gain: lot.gain,
                    purchased_this_year: false,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            people,
            lots,
            cash: inputs.cash,
        })
    }

    pub fn apply_growth(&mut self, rate: f64, lot_rate: f64, cash_rate: f64) {
        for person in &mut self.people {
            person.pretax = (person.pretax * (1.0 + rate)).max(0.0);
            person.pretax_457b = (person.pretax_457b * (1.0 + rate)).max(0.0);
            person.roth.balance = (person.roth.balance * (1.0 + rate)).max(0.0);
            person.roth.fit_basis_to_balance();
        }
        for lot in &mut self.lots {
            let growth = (lot.balance * lot_rate).max(-lot.balance);
            lot.balance += growth;
            lot.gain += growth;
        }
        self.cash = (self.cash * (1.0 + cash_rate)).max(0.0);
    }

    pub fn clear_purchase_flags(&mut self) {
        for lot in &mut self.lots {
            lot.purchased_this_year = false;
        }
    }

    pub fn add_lot(&mut self, amount: f64) {
        if amount > BALANCE_EPSILON {
            self.lots.push(TaxableLot {
                balance: amount,
                gain: 0.0,
                purchased_this_year: true,
            });
        }
    }

    pub fn advance_ages(&mut self) {
        for person in &mut self.people {
            person.age += 1;
        }
    }

    pub fn lots_balance(&self) -> f64 {
        self.lots.iter().map(|l| l.balance).sum()
    }

    pub fn eligible_lots_balance(&self) -> f64 {
        self.lots
            .iter()
            .filter(|l| l.is_eligible())
            .map(|l| l.balance)
            .sum()
    }

    pub fn lots_gain(&self) -> f64 {
        self.lots.iter().map(|l| l.gain).sum()
    }

    pub fn total_pretax(&self) -> f64 {
        self.people.iter().map(|p| p.pretax).sum()
    }

    pub fn total_457b(&self) -> f64 {
        self.people.iter().map(|p| p.pretax_457b).sum()
    }

    pub fn total_roth(&self) -> f64 {
        self.people.iter().map(|p| p.roth.balance).sum()
    }

    pub fn total_roth_contributions(&self) -> f64 {
        self.people.iter().map(|p| p.roth.contributions).sum()
    }

    pub fn total(&self) -> f64 {
        self.total_pretax() + self.total_457b() + self.total_roth() + self.lots_balance() + self.cash
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LotTarget {
    Cash(f64),
    Gain(f64),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LotOrder {
    LowestGainFirst,
    HighestGainFirst,
}

pub fn withdraw_from_lots(
    lots: &mut [TaxableLot],
    target: LotTarget,
    order: LotOrder,
    mode: Mode,
) -> WithdrawalOutcome {
    let mut candidates: Vec<usize> = (0..lots.len()).filter(|&i| lots[i].is_eligible()).collect();
    candidates.sort_by(|&a, &b| {
        let ord = lots[a].gain_ratio().total_cmp(&lots[b].gain_ratio());
        match order {
            LotOrder::LowestGainFirst => ord,
            LotOrder::HighestGainFirst => ord.reverse(),
        }
    });

    let mut outcome = WithdrawalOutcome::default();
    for i in candidates {
        let lot = lots[i];
        let sale = match target {
            LotTarget::Cash(amount) => {
                let remaining = amount - outcome.cash;
                if remaining <= BALANCE_EPSILON {
                    break;
                }
                remaining.min(lot.balance)
            }
            LotTarget::Gain(amount) => {
                let remaining = amount - outcome.ltcg_income;
                let ratio = lot.gain_ratio();
                if remaining <= BALANCE_EPSILON || ratio <= 0.0 {
                    break;
                }
                (remaining / ratio).min(lot.balance)
            }
        };

        let realized = if mode.executes() {
            lots[i].sell(sale)
        } else {
            let mut probe = lot;
            probe.sell(sale)
        };
        outcome.cash += sale;
        outcome.ltcg_income += realized;
    }
    outcome
}

pub fn withdraw_from_457b(person: &mut Person, amount: f64, mode: Mode) -> WithdrawalOutcome {
    let x = amount.min(person.pretax_457b).max(0.0);
    if mode.executes() {
        person.pretax_457b -= x;
    }
    WithdrawalOutcome {
        cash: x,
        standard_income: x,
        ..WithdrawalOutcome::default()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PreTaxRoute {
    ConvertIfEarly,
    CashOut,
}

pub fn withdraw_from_pretax(
    person: &mut Person,
    amount: f64,
    route: PreTaxRoute,
    mode: Mode,
) -> WithdrawalOutcome {
    let x = amount.min(person.pretax).max(0.0);
    let early = !person.penalty_free();
    let convert = early && route == PreTaxRoute::ConvertIfEarly;

    if mode.executes() && x > 0.0 {
        person.pretax -= x;
        if convert {
            person.roth.balance += x;
            person.roth.conversions.push(ConversionRecord {
                remaining: x,
                age_at_conversion: person.age,
            });
        }
    }

    if convert {
        WithdrawalOutcome {
            standard_income: x,
            converted: x,
            ..WithdrawalOutcome::default()
        }
    } else {
        WithdrawalOutcome {
            cash: x,
            standard_income: x,
            penalty: if early { x * EARLY_WITHDRAWAL_PENALTY } else { 0.0 },
            ..WithdrawalOutcome::default()
        }
    }
}

pub fn penalty_free_roth_available(person: &Person) -> f64 {
    if person.penalty_free() {
        return person.roth.balance;
    }
    let seasoned: f64 = person
        .roth
        .conversions
        .iter()
        .filter(|c| c.is_seasoned(person.age))
        .map(|c| c.remaining)
        .sum();
    (person.roth.contributions + seasoned).min(person.roth.balance)
}

pub fn withdraw_roth_penalty_free(person: &mut Person, amount: f64, mode: Mode) -> WithdrawalOutcome {
    let amount = amount.min(penalty_free_roth_available(person)).max(0.0);
    let age = person.age;
    let mut roth = person.roth.clone();

    let mut cash = roth.take_contributions(amount);
    cash += roth.take_conversions(amount - cash, age, true);
    if person.penalty_free() {
        cash += roth.take_conversions(amount - cash, age, false);
        cash += roth.take_earnings(amount - cash);
    }

    if mode.executes() {
        person.roth = roth;
        check_roth_consistency(person);
    }
    WithdrawalOutcome {
        cash,
        ..WithdrawalOutcome::default()
    }
}

pub fn withdraw_roth_with_penalty(person: &mut Person, amount: f64, mode: Mode) -> WithdrawalOutcome {
    let amount = amount.min(person.roth.balance).max(0.0);
    let age = person.age;
    let early = !person.penalty_free();
    let mut roth = person.roth.clone();
    let mut outcome = WithdrawalOutcome::default();

    let mut free = roth.take_contributions(amount);
    free += roth.take_conversions(amount - free, age, true);
    let young = roth.take_conversions(amount - free, age, false);
    let earnings = roth.take_earnings(amount - free - young);

    outcome.cash = free + young + earnings;
    if early {
        outcome.penalty = (young + earnings) * EARLY_WITHDRAWAL_PENALTY;
        outcome.standard_income = earnings;
    }

    if mode.executes() {
        person.roth = roth;
        check_roth_consistency(person);
    }
    outcome
}

fn check_roth_consistency(person: &mut Person) {
    let roth = &mut person.roth;
    roth.balance = roth.balance.max(0.0);
    let tracked = roth.contributions + roth.conversion_total();
    if tracked > roth.balance + CONSISTENCY_EPSILON {
        log::warn!(
            "roth basis {tracked:.2} exceeds balance {:.2} at age {}",
            roth.balance,
            person.age
        );
    }
}
