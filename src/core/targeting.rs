use super::tables::{FilingStatus, social_security_thresholds};
use super::tax::taxable_social_security;

const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomeTargets {
    pub taxable_ss: f64,
    pub max_standard_income: f64,
    pub max_total_income: f64,
    pub adjustable_standard: f64,
}

// Largest `x >= 0` with `base + x + taxable_ss(other + x) <= ceiling`.
pub fn max_additional_income(
    base: f64,
    other: f64,
    total_ss: f64,
    ceiling: f64,
    status: FilingStatus,
) -> f64 {
    let income_at = |x: f64| base + x + taxable_social_security(other + x, total_ss, status);

    let mut lo = 0.0;
    let mut f_lo = income_at(0.0);
    if f_lo >= ceiling {
        return 0.0;
    }

    for x in ss_kinks(other, total_ss, status) {
        if x <= lo + 1e-9 {
            continue;
        }
        let f = income_at(x);
        if f >= ceiling {
            return lo + (ceiling - f_lo) * (x - lo) / (f - f_lo);
        }
        lo = x;
        f_lo = f;
    }

    // past the last kink taxable SS is flat (capped or zero)
    lo + (ceiling - f_lo)
}

fn ss_kinks(other: f64, total_ss: f64, status: FilingStatus) -> Vec<f64> {
    if total_ss <= 0.0 {
        return Vec::new();
    }
    let (base, band) = social_security_thresholds(status);
    let upper = base + band;
    let half_band = (0.5 * band).min(0.5 * total_ss);
    let cap_point = upper + (0.85 * total_ss - half_band) / 0.85;

    let mut provisional = vec![base, upper, cap_point];
    if base + total_ss < upper {
        provisional.push(base + total_ss);
    }

    let offset = other.max(0.0) + 0.5 * total_ss;
    let mut kinks: Vec<f64> = provisional
        .into_iter()
        .map(|p| p - offset)
        .filter(|x| *x > 0.0)
        .collect();
    kinks.sort_by(f64::total_cmp);
    kinks
}

pub fn resolve_income_targets(
    fixed_standard: f64,
    fixed_ltcg: f64,
    total_ss: f64,
    standard_ceiling: f64,
    total_ceiling: f64,
    status: FilingStatus,
) -> IncomeTargets {
    let other = fixed_standard + fixed_ltcg;
    let min_taxable_ss = taxable_social_security(other, total_ss, status);

    let fixed_with_ss = fixed_standard + min_taxable_ss;
    let max_standard_income = standard_ceiling.max(fixed_with_ss);
    let mut max_total_income = total_ceiling.max(fixed_with_ss + fixed_ltcg);

    let adjustable_standard =
        max_additional_income(fixed_standard, other, total_ss, max_standard_income, status);
    let taxable_ss = taxable_social_security(other + adjustable_standard, total_ss, status);

    if taxable_ss + EPSILON < 0.85 * total_ss {
        // further gains would drag more SS into standard income
        max_total_income = max_standard_income + fixed_ltcg;
    } else {
        max_total_income = max_total_income.max(max_standard_income + fixed_ltcg);
    }

    log::debug!(
        "income targets: standard {max_standard_income:.2}, total {max_total_income:.2}, \
         adjustable {adjustable_standard:.2}, taxable ss {taxable_ss:.2}"
    );

    IncomeTargets {
        taxable_ss,
        max_standard_income,
        max_total_income,
        adjustable_standard,
    }
}
