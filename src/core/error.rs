use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown filing status '{0}' (expected single or married-filing-jointly)")]
    UnknownFilingStatus(String),
    #[error("tax table: {0}")]
    InvalidTaxTable(String),
    #[error("scenario must describe one or two people, got {0}")]
    PeopleCount(usize),
    #[error("{field} must be finite and >= 0, got {value}")]
    InvalidAmount { field: String, value: f64 },
    #[error("taxable lot {index}: gain {gain} exceeds balance {balance}")]
    LotGainExceedsBalance {
        index: usize,
        gain: f64,
        balance: f64,
    },
    #[error("person {person}: roth contributions {contributions} exceed roth balance {balance}")]
    RothContributionsExceedBalance {
        person: usize,
        contributions: f64,
        balance: f64,
    },
    #[error("income stream owner {owner} does not exist")]
    UnknownIncomeOwner { owner: usize },
}
