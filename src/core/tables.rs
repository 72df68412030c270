use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
}

impl FromStr for FilingStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(FilingStatus::Single),
            "married-filing-jointly" | "married_filing_jointly" | "joint" | "mfj" => {
                Ok(FilingStatus::MarriedFilingJointly)
            }
            other => Err(ConfigError::UnknownFilingStatus(other.to_string())),
        }
    }
}

pub fn social_security_thresholds(status: FilingStatus) -> (f64, f64) {
    match status {
        FilingStatus::Single => (25_000.0, 9_000.0),
        FilingStatus::MarriedFilingJointly => (32_000.0, 12_000.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRateTable {
    pub bracket_minimums: Vec<f64>,
    pub rates: Vec<f64>,
    pub standard_deduction: f64,
    pub ltcg_bracket_minimums: [f64; 3],
    pub ltcg_rates: [f64; 3],
}

impl TaxRateTable {
    pub fn for_status(status: FilingStatus) -> Self {
        let rates = vec![0.10, 0.12, 0.22, 0.24, 0.32, 0.35, 0.37];
        let ltcg_rates = [0.0, 0.15, 0.20];
        match status {
            FilingStatus::Single => Self {
                bracket_minimums: vec![
                    0.0, 11_000.0, 44_725.0, 95_375.0, 182_100.0, 231_250.0, 578_125.0,
                ],
                rates,
                standard_deduction: 13_850.0,
                ltcg_bracket_minimums: [0.0, 44_625.0, 492_300.0],
                ltcg_rates,
            },
            FilingStatus::MarriedFilingJointly => Self {
                bracket_minimums: vec![
                    0.0, 22_000.0, 89_450.0, 190_750.0, 364_200.0, 462_500.0, 693_750.0,
                ],
                rates,
                standard_deduction: 27_700.0,
                ltcg_bracket_minimums: [0.0, 89_250.0, 553_850.0],
                ltcg_rates,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bracket_minimums.is_empty() {
            return Err(ConfigError::InvalidTaxTable(
                "at least one bracket is required".to_string(),
            ));
        }
        if self.bracket_minimums.len() != self.rates.len() {
            return Err(ConfigError::InvalidTaxTable(format!(
                "{} bracket minimums but {} rates",
                self.bracket_minimums.len(),
                self.rates.len()
            )));
        }
        check_minimums("ordinary", &self.bracket_minimums)?;
        check_minimums("capital gains", &self.ltcg_bracket_minimums)?;
        for rate in self.rates.iter().chain(self.ltcg_rates.iter()) {
            if !(0.0..=1.0).contains(rate) {
                return Err(ConfigError::InvalidTaxTable(format!(
                    "rate {rate} must be between 0 and 1"
                )));
            }
        }
        if !self.standard_deduction.is_finite() || self.standard_deduction < 0.0 {
            return Err(ConfigError::InvalidTaxTable(
                "standard deduction must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bracket_top(&self, index: usize) -> f64 {
        self.bracket_minimums
            .get(index + 1)
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

fn check_minimums(label: &str, minimums: &[f64]) -> Result<(), ConfigError> {
    if minimums.first().copied() != Some(0.0) {
        return Err(ConfigError::InvalidTaxTable(format!(
            "{label} brackets must start at 0"
        )));
    }
    if minimums.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ConfigError::InvalidTaxTable(format!(
            "{label} bracket minimums must be strictly increasing"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RmdTable {
    first_age: u32,
    divisors: Vec<f64>,
}

impl RmdTable {
    // IRS Uniform Lifetime Table, ages 72 through 120+.
    pub fn uniform_lifetime() -> Self {
        Self {
            first_age: 72,
            divisors: vec![
                27.4, 26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, // 72-81
                18.5, 17.7, 16.8, 16.0, 15.2, 14.4, 13.7, 12.9, 12.2, 11.5, // 82-91
                10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4, 6.0, // 92-101
                5.6, 5.2, 4.9, 4.6, 4.3, 4.1, 3.9, 3.7, 3.5, 3.4, // 102-111
                3.3, 3.1, 3.0, 2.9, 2.8, 2.7, 2.5, 2.3, 2.0, // 112-120
            ],
        }
    }

    pub fn divisor_for_age(&self, age: u32) -> Option<f64> {
        if age < self.first_age {
            return None;
        }
        let idx = ((age - self.first_age) as usize).min(self.divisors.len() - 1);
        self.divisors.get(idx).copied()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcaRegion {
    Contiguous,
    Alaska,
    Hawaii,
}

#[derive(Debug, Clone)]
pub struct AcaTables {
    pub contiguous: (f64, f64),
    pub alaska: (f64, f64),
    pub hawaii: (f64, f64),
    pub contribution_schedule: Vec<(f64, f64)>,
}

impl Default for AcaTables {
    fn default() -> Self {
        Self {
            contiguous: (14_580.0, 5_140.0),
            alaska: (18_210.0, 6_430.0),
            hawaii: (16_770.0, 5_910.0),
            contribution_schedule: vec![
                (150.0, 0.0),
                (200.0, 0.02),
                (250.0, 0.04),
                (300.0, 0.06),
                (400.0, 0.085),
            ],
        }
    }
}

impl AcaTables {
    pub fn poverty_line(&self, region: AcaRegion, household_size: u32) -> f64 {
        let (base, per_person) = match region {
            AcaRegion::Contiguous => self.contiguous,
            AcaRegion::Alaska => self.alaska,
            AcaRegion::Hawaii => self.hawaii,
        };
        base + per_person * household_size.saturating_sub(1) as f64
    }

    pub fn contribution_rate(&self, fpl_percent: f64) -> f64 {
        let schedule = &self.contribution_schedule;
        let Some(&(first_pct, first_rate)) = schedule.first() else {
            return 0.0;
        };
        if fpl_percent <= first_pct {
            return first_rate;
        }
        for pair in schedule.windows(2) {
            let (lo_pct, lo_rate) = pair[0];
            let (hi_pct, hi_rate) = pair[1];
            if fpl_percent <= hi_pct {
                let w = (fpl_percent - lo_pct) / (hi_pct - lo_pct);
                return lo_rate + (hi_rate - lo_rate) * w;
            }
        }
        schedule.last().map(|&(_, rate)| rate).unwrap_or(0.0)
    }
}
