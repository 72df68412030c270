use super::tables::{
    AcaRegion, AcaTables, FilingStatus, RmdTable, TaxRateTable, social_security_thresholds,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaxBreakdown {
    pub taxable_standard: f64,
    pub taxable_ltcg: f64,
    pub standard_tax: f64,
    pub ltcg_tax: f64,
    pub total: f64,
    pub standard_bracket_room: f64,
    pub ltcg_bracket_room: f64,
}

pub fn compute_taxes(standard_income: f64, ltcg_income: f64, table: &TaxRateTable) -> TaxBreakdown {
    let standard_income = standard_income.max(0.0);
    let ltcg_income = ltcg_income.max(0.0);
    let deduction = table.standard_deduction.max(0.0);

    let taxable_standard = (standard_income - deduction).max(0.0);
    let unused_deduction = (deduction - standard_income).max(0.0);
    let taxable_ltcg = (ltcg_income - unused_deduction).max(0.0);

    let (standard_tax, bracket_room) = ordinary_tax(taxable_standard, table);
    let standard_bracket_room = if unused_deduction > 0.0 {
        unused_deduction
    } else {
        bracket_room
    };
    let (ltcg_tax, ltcg_bracket_room) = stacked_ltcg_tax(taxable_standard, taxable_ltcg, table);

    TaxBreakdown {
        taxable_standard,
        taxable_ltcg,
        standard_tax,
        ltcg_tax,
        total: standard_tax + ltcg_tax,
        standard_bracket_room,
        ltcg_bracket_room,
    }
}

fn ordinary_tax(taxable: f64, table: &TaxRateTable) -> (f64, f64) {
    let mins = &table.bracket_minimums;
    let top = mins.iter().rposition(|&m| m <= taxable).unwrap_or(0);

    let mut tax = 0.0;
    for i in 0..top {
        tax += (mins[i + 1] - mins[i]) * table.rates[i];
    }
    tax += (taxable - mins[top]).max(0.0) * table.rates[top];

    (tax, table.bracket_top(top) - taxable)
}

fn stacked_ltcg_tax(taxable_standard: f64, taxable_ltcg: f64, table: &TaxRateTable) -> (f64, f64) {
    let mins = table.ltcg_bracket_minimums;
    let mut tax = 0.0;
    let mut room = f64::INFINITY;

    for j in 0..mins.len() {
        let start = (mins[j] - taxable_standard).max(0.0);
        let end = match mins.get(j + 1) {
            Some(next) => (next - taxable_standard).max(0.0),
            None => f64::INFINITY,
        };
        // fully consumed by standard income
        if end <= 0.0 {
            continue;
        }
        if taxable_ltcg > start {
            tax += (taxable_ltcg.min(end) - start) * table.ltcg_rates[j];
        }
        if taxable_ltcg >= start && taxable_ltcg < end {
            room = end - taxable_ltcg;
        }
    }

    (tax, room)
}

pub fn taxable_social_security(other_income: f64, total_ss: f64, status: FilingStatus) -> f64 {
    if total_ss <= 0.0 {
        return 0.0;
    }
    let (base, band) = social_security_thresholds(status);
    let upper = base + band;
    let provisional = other_income.max(0.0) + 0.5 * total_ss;

    if provisional <= base {
        0.0
    } else if provisional <= upper {
        (0.5 * (provisional - base)).min(0.5 * total_ss)
    } else {
        let half_band = (0.5 * band).min(0.5 * total_ss);
        (0.85 * (provisional - upper) + half_band).min(0.85 * total_ss)
    }
}

// Line-by-line benefits worksheet, kept as a cross-check on the closed form.
pub fn taxable_social_security_worksheet(
    other_income: f64,
    total_ss: f64,
    status: FilingStatus,
) -> f64 {
    let (base, band) = social_security_thresholds(status);
    let line1 = total_ss.max(0.0);
    let line2 = 0.5 * line1;
    let line3 = other_income.max(0.0);
    let line4 = line2 + line3;
    if line4 <= base {
        return 0.0;
    }
    let line5 = line4 - base;
    let line6 = band;
    let line7 = (line5 - line6).max(0.0);
    let line8 = line5.min(line6);
    let line9 = 0.5 * line8;
    let line10 = line2.min(line9);
    let line11 = 0.85 * line7;
    let line12 = line10 + line11;
    let line13 = 0.85 * line1;
    line12.min(line13)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequiredDistribution {
    pub amount: f64,
    pub rate: f64,
}

pub fn required_minimum_distribution(
    balance: f64,
    age: u32,
    table: &RmdTable,
) -> Option<RequiredDistribution> {
    let divisor = table.divisor_for_age(age)?;
    if divisor <= 0.0 {
        return None;
    }
    Some(RequiredDistribution {
        amount: balance.max(0.0) / divisor,
        rate: 1.0 / divisor,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcaSubsidy {
    pub fpl_percent: f64,
    pub eligible: bool,
    pub expected_contribution: f64,
    pub subsidy: f64,
}

pub fn aca_subsidy(
    income: f64,
    household_size: u32,
    region: AcaRegion,
    benchmark_premium: f64,
    tables: &AcaTables,
) -> AcaSubsidy {
    let poverty_line = tables.poverty_line(region, household_size.max(1));
    let income = income.max(0.0);
    let fpl_percent = 100.0 * income / poverty_line;

    if fpl_percent <= 100.0 {
        return AcaSubsidy {
            fpl_percent,
            eligible: false,
            expected_contribution: 0.0,
            subsidy: 0.0,
        };
    }

    let expected_contribution = income * tables.contribution_rate(fpl_percent);
    AcaSubsidy {
        fpl_percent,
        eligible: true,
        expected_contribution,
        subsidy: (benchmark_premium - expected_contribution).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn single() -> TaxRateTable {
        TaxRateTable::for_status(FilingStatus::Single)
    }

    #[test]
    fn zero_income_has_zero_tax_and_full_deduction_room() {
        let taxes = compute_taxes(0.0, 0.0, &single());
        assert_approx(taxes.total, 0.0);
        assert_approx(taxes.standard_bracket_room, 13_850.0);
        assert_approx(taxes.ltcg_bracket_room, 44_625.0);
    }

    #[test]
    fn standard_income_fills_brackets_progressively() {
        let taxes = compute_taxes(50_000.0, 0.0, &single());
        // taxable 36,150: 1,100 in the 10% bracket plus 25,150 at 12%
        assert_approx(taxes.taxable_standard, 36_150.0);
        assert_approx(taxes.standard_tax, 1_100.0 + 25_150.0 * 0.12);
        assert_approx(taxes.standard_bracket_room, 44_725.0 - 36_150.0);
    }

    #[test]
    fn income_exactly_on_a_bracket_edge_is_handled() {
        let taxes = compute_taxes(13_850.0 + 11_000.0, 0.0, &single());
        assert_approx(taxes.standard_tax, 1_100.0);
        assert_approx(taxes.standard_bracket_room, 44_725.0 - 11_000.0);
    }

    #[test]
    fn unused_deduction_offsets_capital_gains() {
        let taxes = compute_taxes(0.0, 100_000.0, &single());
        assert_approx(taxes.taxable_ltcg, 86_150.0);
        assert_approx(taxes.ltcg_tax, (86_150.0 - 44_625.0) * 0.15);
    }

    #[test]
    fn capital_gains_brackets_stack_on_top_of_standard_income() {
        let taxes = compute_taxes(40_000.0, 30_000.0, &single());
        let taxable_standard = 40_000.0 - 13_850.0;
        let zero_rate_room = 44_625.0 - taxable_standard;
        assert_approx(taxes.ltcg_tax, (30_000.0 - zero_rate_room) * 0.15);
        assert_approx(taxes.standard_tax, 1_100.0 + (taxable_standard - 11_000.0) * 0.12);
        assert_approx(taxes.total, taxes.standard_tax + taxes.ltcg_tax);
    }

    #[test]
    fn standard_income_beyond_zero_rate_bracket_removes_it() {
        let taxes = compute_taxes(13_850.0 + 60_000.0, 10_000.0, &single());
        assert_approx(taxes.ltcg_tax, 1_500.0);
        assert_approx(taxes.ltcg_bracket_room, 492_300.0 - 60_000.0 - 10_000.0);
    }

    #[test]
    fn social_security_examples_match_hand_calculation() {
        let s = FilingStatus::Single;
        assert_approx(taxable_social_security(10_000.0, 20_000.0, s), 0.0);
        // provisional 30,000: half of 5,000
        assert_approx(taxable_social_security(20_000.0, 20_000.0, s), 2_500.0);
        // provisional 40,000: 85% of 6,000 plus 4,500
        assert_approx(taxable_social_security(30_000.0, 20_000.0, s), 9_600.0);
        // capped at 85%
        assert_approx(taxable_social_security(500_000.0, 20_000.0, s), 17_000.0);
    }

    #[test]
    fn social_security_closed_form_matches_worksheet_on_grid() {
        for status in [FilingStatus::Single, FilingStatus::MarriedFilingJointly] {
            for other_step in 0..=2_000 {
                let other = other_step as f64 * 100.0;
                for ss_step in 0..=100 {
                    let ss = ss_step as f64 * 1_000.0;
                    let closed = taxable_social_security(other, ss, status);
                    let worksheet = taxable_social_security_worksheet(other, ss, status);
                    assert!(
                        (closed - worksheet).abs() <= 0.01,
                        "{status:?} other={other} ss={ss}: {closed} vs {worksheet}"
                    );
                }
            }
        }
    }

    #[test]
    fn rmd_divides_balance_by_divisor() {
        let table = RmdTable::uniform_lifetime();
        let rmd = required_minimum_distribution(274_000.0, 72, &table).expect("rmd at 72");
        assert_approx(rmd.amount, 10_000.0);
        assert_approx(rmd.rate, 1.0 / 27.4);
        assert!(required_minimum_distribution(100_000.0, 65, &table).is_none());
    }

    #[test]
    fn aca_subsidy_is_zero_at_or_below_poverty_line() {
        let tables = AcaTables::default();
        let at_line = aca_subsidy(14_580.0, 1, AcaRegion::Contiguous, 8_000.0, &tables);
        assert!(!at_line.eligible);
        assert_eq!(at_line.subsidy, 0.0);

        let low = aca_subsidy(20_000.0, 1, AcaRegion::Contiguous, 8_000.0, &tables);
        assert!(low.eligible);
        assert_approx(low.subsidy, 8_000.0);
    }

    #[test]
    fn aca_subsidy_uses_expected_contribution_above_150_percent() {
        let tables = AcaTables::default();
        let income = 14_580.0 * 3.5;
        let result = aca_subsidy(income, 1, AcaRegion::Contiguous, 8_000.0, &tables);
        assert_approx(result.fpl_percent, 350.0);
        assert_approx(result.expected_contribution, income * 0.0725);
        assert_approx(result.subsidy, 8_000.0 - income * 0.0725);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tax_is_non_decreasing_in_standard_income(
            ltcg in 0u32..300_000,
            low in 0u32..700_000,
            delta in 0u32..50_000,
            joint in proptest::bool::ANY
        ) {
            let status = if joint { FilingStatus::MarriedFilingJointly } else { FilingStatus::Single };
            let table = TaxRateTable::for_status(status);
            let a = compute_taxes(low as f64, ltcg as f64, &table);
            let b = compute_taxes((low + delta) as f64, ltcg as f64, &table);
            prop_assert!(b.total + 1e-9 >= a.total);
            prop_assert!(a.total >= 0.0);
        }

        #[test]
        fn prop_zero_standard_income_taxes_only_gains_above_deduction(ltcg in 0u32..900_000) {
            let table = single();
            let taxes = compute_taxes(0.0, ltcg as f64, &table);
            let as_gains_only = compute_taxes(table.standard_deduction, ltcg as f64 - table.standard_deduction, &table);
            prop_assert!(taxes.standard_tax.abs() < 1e-9);
            prop_assert!((taxes.total - as_gains_only.total).abs() < 1e-6);
        }

        #[test]
        fn prop_taxable_social_security_is_bounded(
            other in 0u32..400_000,
            ss in 0u32..120_000,
            joint in proptest::bool::ANY
        ) {
            let status = if joint { FilingStatus::MarriedFilingJointly } else { FilingStatus::Single };
            let taxable = taxable_social_security(other as f64, ss as f64, status);
            prop_assert!(taxable >= 0.0);
            prop_assert!(taxable <= 0.85 * ss as f64 + 1e-9);
        }

        #[test]
        fn prop_aca_subsidy_non_increasing_once_eligible(
            income in 15_000u32..200_000,
            delta in 1u32..20_000,
            household in 1u32..5
        ) {
            let tables = AcaTables::default();
            let a = aca_subsidy(income as f64, household, AcaRegion::Contiguous, 9_000.0, &tables);
            let b = aca_subsidy((income + delta) as f64, household, AcaRegion::Contiguous, 9_000.0, &tables);
            if a.eligible {
                prop_assert!(b.subsidy <= a.subsidy + 1e-9);
            }
        }
    }
}
