use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    AcaConfig, AcaRegion, ExpenseSolveConfig, ExpenseStep, FilingStatus,
    IncomeCeiling, IncomeStream, Inputs, LotInputs, PersonInputs, SimulationContext,
    SimulationResult, WithdrawalStrategy, simulate, solve_max_expenses,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalStrategy {
    Tpm,
    Traditional,
}

impl From<CliWithdrawalStrategy> for WithdrawalStrategy {
    fn from(value: CliWithdrawalStrategy) -> Self {
        match value {
            CliWithdrawalStrategy::Tpm => WithdrawalStrategy::TaxPenaltyMinimization,
            CliWithdrawalStrategy::Traditional => WithdrawalStrategy::Traditional,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliAcaRegion {
    Contiguous,
    Alaska,
    Hawaii,
}

impl From<CliAcaRegion> for AcaRegion {
    fn from(value: CliAcaRegion) -> Self {
        match value {
            CliAcaRegion::Contiguous => AcaRegion::Contiguous,
            CliAcaRegion::Alaska => AcaRegion::Alaska,
            CliAcaRegion::Hawaii => AcaRegion::Hawaii,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalStrategy {
    #[serde(alias = "taxPenaltyMinimization", alias = "tax-penalty-minimization")]
    Tpm,
    Traditional,
}

impl From<ApiWithdrawalStrategy> for CliWithdrawalStrategy {
    fn from(value: ApiWithdrawalStrategy) -> Self {
        match value {
            ApiWithdrawalStrategy::Tpm => CliWithdrawalStrategy::Tpm,
            ApiWithdrawalStrategy::Traditional => CliWithdrawalStrategy::Traditional,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiAcaRegion {
    #[serde(alias = "contiguous48", alias = "lower48")]
    Contiguous,
    Alaska,
    Hawaii,
}

impl From<ApiAcaRegion> for CliAcaRegion {
    fn from(value: ApiAcaRegion) -> Self {
        match value {
            ApiAcaRegion::Contiguous => CliAcaRegion::Contiguous,
            ApiAcaRegion::Alaska => CliAcaRegion::Alaska,
            ApiAcaRegion::Hawaii => CliAcaRegion::Hawaii,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiLot {
    balance: f64,
    #[serde(default)]
    gain: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    filing_status: Option<String>,
    years: Option<u32>,

    age: Option<u32>,
    pretax: Option<f64>,
    pretax_457b: Option<f64>,
    roth: Option<f64>,
    roth_contributions: Option<f64>,
    rmd_start_age: Option<u32>,
    ss_start_age: Option<u32>,
    ss_annual: Option<f64>,

    spouse_age: Option<u32>,
    spouse_pretax: Option<f64>,
    spouse_pretax_457b: Option<f64>,
    spouse_roth: Option<f64>,
    spouse_roth_contributions: Option<f64>,
    spouse_rmd_start_age: Option<u32>,
    spouse_ss_start_age: Option<u32>,
    spouse_ss_annual: Option<f64>,

    lots: Option<Vec<ApiLot>>,
    cash: Option<f64>,

    expenses: Option<f64>,
    expense_steps: Option<Vec<ExpenseStep>>,
    other_income: Option<Vec<IncomeStream>>,

    return_rate: Option<f64>,
    cash_return_rate: Option<f64>,
    dividend_yield: Option<f64>,

    standard_ceiling: Option<String>,
    total_ceiling: Option<String>,
    strategy: Option<ApiWithdrawalStrategy>,
    prefer_457b_first: Option<bool>,

    aca_benchmark_premium: Option<f64>,
    aca_household_size: Option<u32>,
    aca_region: Option<ApiAcaRegion>,
    aca_end_age: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    #[serde(flatten)]
    scenario: SimulatePayload,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Year-by-year retirement withdrawal planner (pre-tax, 457b, Roth, taxable lots, cash)"
)]
pub struct Invocation {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Project one scenario and print the per-year table as JSON.
    Simulate(Cli),
    /// Find the largest base expense level that never runs out of money.
    Solve(SolveCli),
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value = "single", help = "single or married-filing-jointly")]
    filing_status: String,
    #[arg(long, default_value_t = 30)]
    years: u32,

    #[arg(long)]
    age: u32,
    #[arg(long, default_value_t = 0.0)]
    pretax: f64,
    #[arg(long = "pretax-457b", default_value_t = 0.0)]
    pretax_457b: f64,
    #[arg(long, default_value_t = 0.0)]
    roth: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Original contributions inside the Roth balance"
    )]
    roth_contributions: f64,
    #[arg(long, default_value_t = 73)]
    rmd_start_age: u32,
    #[arg(long, default_value_t = 67)]
    ss_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    ss_annual: f64,

    #[arg(long, help = "Adds a second person when set")]
    spouse_age: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    spouse_pretax: f64,
    #[arg(long = "spouse-pretax-457b", default_value_t = 0.0)]
    spouse_pretax_457b: f64,
    #[arg(long, default_value_t = 0.0)]
    spouse_roth: f64,
    #[arg(long, default_value_t = 0.0)]
    spouse_roth_contributions: f64,
    #[arg(long, default_value_t = 73)]
    spouse_rmd_start_age: u32,
    #[arg(long, default_value_t = 67)]
    spouse_ss_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    spouse_ss_annual: f64,

    #[arg(
        long = "lot",
        value_parser = parse_lot,
        help = "Taxable lot as BALANCE:GAIN (repeatable)"
    )]
    lots: Vec<LotInputs>,
    #[arg(long, default_value_t = 0.0)]
    cash: f64,

    #[arg(long)]
    expenses: f64,
    #[arg(
        long = "expense-step",
        value_parser = parse_expense_step,
        help = "AGE:CHANGE applied from the primary person's AGE on (repeatable)"
    )]
    expense_steps: Vec<ExpenseStep>,
    #[arg(
        long = "other-income",
        value_parser = parse_income_stream,
        help = "AMOUNT:OWNER:START_AGE[:END_AGE] standard income (repeatable)"
    )]
    other_income: Vec<IncomeStream>,

    #[arg(long, default_value_t = 7.0, help = "Annual return in percent")]
    return_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Cash reserve return in percent")]
    cash_return_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Qualified dividend yield on taxable lots in percent"
    )]
    dividend_yield: f64,

    #[arg(
        long,
        value_parser = parse_ceiling,
        default_value = "standard-deduction",
        help = "standard-deduction | bracket-top:N | zero-cap-gains | income:AMOUNT"
    )]
    standard_ceiling: IncomeCeiling,
    #[arg(long, value_parser = parse_ceiling, default_value = "zero-cap-gains")]
    total_ceiling: IncomeCeiling,
    #[arg(long, value_enum, default_value_t = CliWithdrawalStrategy::Tpm)]
    strategy: CliWithdrawalStrategy,
    #[arg(long, help = "Fill the standard-income ceiling from pre-tax before 457b")]
    pretax_before_457b: bool,

    #[arg(long, help = "Enables the ACA subsidy true-up")]
    aca_benchmark_premium: Option<f64>,
    #[arg(long, default_value_t = 1)]
    aca_household_size: u32,
    #[arg(long, value_enum, default_value_t = CliAcaRegion::Contiguous)]
    aca_region: CliAcaRegion,
    #[arg(long, default_value_t = 65)]
    aca_end_age: u32,
}

#[derive(Args, Debug)]
pub struct SolveCli {
    #[command(flatten)]
    scenario: Cli,
    #[arg(long, default_value_t = 0.0)]
    search_min: f64,
    #[arg(long, default_value_t = 500_000.0)]
    search_max: f64,
    #[arg(long, default_value_t = 50.0)]
    tolerance: f64,
    #[arg(long, default_value_t = 40)]
    max_iterations: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    filing_status: FilingStatus,
    resolved_standard_ceiling: f64,
    resolved_total_ceiling: f64,
    #[serde(flatten)]
    result: SimulationResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn split_fields<'a>(raw: &'a str, flag: &str, min: usize, max: usize) -> Result<Vec<&'a str>, String> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if parts.len() < min || parts.len() > max {
        return Err(format!("{flag} expects {min} to {max} ':'-separated fields, got '{raw}'"));
    }
    Ok(parts)
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("{flag}: '{raw}' is not a valid number"))
}

fn parse_lot(raw: &str) -> Result<LotInputs, String> {
    let parts = split_fields(raw, "--lot", 1, 2)?;
    let balance = parse_number::<f64>(parts[0], "--lot")?;
    let gain = match parts.get(1) {
        Some(v) => parse_number::<f64>(v, "--lot")?,
        None => 0.0,
    };
    Ok(LotInputs { balance, gain })
}

fn parse_expense_step(raw: &str) -> Result<ExpenseStep, String> {
    let parts = split_fields(raw, "--expense-step", 2, 2)?;
    Ok(ExpenseStep {
        age: parse_number(parts[0], "--expense-step")?,
        change: parse_number(parts[1], "--expense-step")?,
    })
}

fn parse_income_stream(raw: &str) -> Result<IncomeStream, String> {
    let parts = split_fields(raw, "--other-income", 3, 4)?;
    let end_age = match parts.get(3) {
        Some(v) => Some(parse_number(v, "--other-income")?),
        None => None,
    };
    Ok(IncomeStream {
        amount: parse_number(parts[0], "--other-income")?,
        owner: parse_number(parts[1], "--other-income")?,
        start_age: parse_number(parts[2], "--other-income")?,
        end_age,
    })
}

fn parse_ceiling(raw: &str) -> Result<IncomeCeiling, String> {
    let raw = raw.trim();
    let (kind, arg) = match raw.split_once(':') {
        Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
        None => (raw, None),
    };
    match (kind.to_ascii_lowercase().as_str(), arg) {
        ("standard-deduction", None) => Ok(IncomeCeiling::StandardDeduction),
        ("zero-cap-gains", None) => Ok(IncomeCeiling::ZeroCapGainsBracket),
        ("bracket-top", Some(n)) => Ok(IncomeCeiling::OrdinaryBracketTop(parse_number(
            n,
            "bracket-top",
        )?)),
        ("income", Some(amount)) => Ok(IncomeCeiling::SpecifiedIncome(parse_number(
            amount, "income",
        )?)),
        _ => Err(format!(
            "unknown income ceiling '{raw}' (expected standard-deduction, bracket-top:N, zero-cap-gains or income:AMOUNT)"
        )),
    }
}

fn build_inputs(cli: Cli) -> Result<Inputs, String> {
    let filing_status = cli
        .filing_status
        .parse::<FilingStatus>()
        .map_err(|e| format!("--filing-status: {e}"))?;

    if cli.years == 0 || cli.years > 100 {
        return Err("--years must be between 1 and 100".to_string());
    }

    if cli.age > 120 {
        return Err("--age must be <= 120".to_string());
    }

    if !cli.expenses.is_finite() || cli.expenses < 0.0 {
        return Err("--expenses must be >= 0".to_string());
    }

    if !cli.return_rate.is_finite() || cli.return_rate <= -100.0 {
        return Err("--return-rate must be > -100".to_string());
    }

    if !cli.cash_return_rate.is_finite() || cli.cash_return_rate <= -100.0 {
        return Err("--cash-return-rate must be > -100".to_string());
    }

    if !(0.0..=100.0).contains(&cli.dividend_yield) {
        return Err("--dividend-yield must be between 0 and 100".to_string());
    }

    if cli.roth_contributions > cli.roth {
        return Err("--roth-contributions must be <= --roth".to_string());
    }

    if cli.spouse_roth_contributions > cli.spouse_roth {
        return Err("--spouse-roth-contributions must be <= --spouse-roth".to_string());
    }

    for lot in &cli.lots {
        if lot.balance < 0.0 || lot.gain > lot.balance {
            return Err("--lot gain must be <= balance and balance >= 0".to_string());
        }
    }

    let people_count = if cli.spouse_age.is_some() { 2 } else { 1 };
    if cli.other_income.iter().any(|s| s.owner >= people_count) {
        return Err("--other-income owner must be 0, or 1 when --spouse-age is set".to_string());
    }

    let aca = match cli.aca_benchmark_premium {
        Some(premium) => {
            if !premium.is_finite() || premium < 0.0 {
                return Err("--aca-benchmark-premium must be >= 0".to_string());
            }
            if cli.aca_household_size == 0 {
                return Err("--aca-household-size must be > 0".to_string());
            }
            Some(AcaConfig {
                benchmark_premium: premium,
                household_size: cli.aca_household_size,
                region: cli.aca_region.into(),
                end_age: cli.aca_end_age,
            })
        }
        None => None,
    };

    let mut people = vec![PersonInputs {
        age: cli.age,
        pretax: cli.pretax,
        pretax_457b: cli.pretax_457b,
        roth: cli.roth,
        roth_contributions: cli.roth_contributions,
        rmd_start_age: cli.rmd_start_age,
        ss_start_age: cli.ss_start_age,
        ss_annual: cli.ss_annual,
    }];
    if let Some(spouse_age) = cli.spouse_age {
        people.push(PersonInputs {
            age: spouse_age,
            pretax: cli.spouse_pretax,
            pretax_457b: cli.spouse_pretax_457b,
            roth: cli.spouse_roth,
            roth_contributions: cli.spouse_roth_contributions,
            rmd_start_age: cli.spouse_rmd_start_age,
            ss_start_age: cli.spouse_ss_start_age,
            ss_annual: cli.spouse_ss_annual,
        });
    }

    Ok(Inputs {
        filing_status,
        tax_table: None,
        people,
        lots: cli.lots,
        cash: cli.cash,
        base_expenses: cli.expenses,
        expense_steps: cli.expense_steps,
        return_rate: cli.return_rate / 100.0,
        cash_return_rate: cli.cash_return_rate / 100.0,
        dividend_yield: cli.dividend_yield / 100.0,
        years: cli.years,
        standard_ceiling: cli.standard_ceiling,
        total_ceiling: cli.total_ceiling,
        strategy: cli.strategy.into(),
        prefer_457b_first: !cli.pretax_before_457b,
        other_income: cli.other_income,
        aca,
    })
}

fn solve_config(args: &SolveCli) -> ExpenseSolveConfig {
    ExpenseSolveConfig {
        search_min: args.search_min,
        search_max: args.search_max,
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
    }
}

fn build_simulate_response(inputs: &Inputs) -> Result<SimulateResponse, String> {
    let ctx = SimulationContext::new(inputs).map_err(|e| e.to_string())?;
    let (resolved_standard_ceiling, resolved_total_ceiling) =
        (ctx.standard_ceiling, ctx.total_ceiling);
    let result = simulate(inputs).map_err(|e| e.to_string())?;
    Ok(SimulateResponse {
        filing_status: inputs.filing_status,
        resolved_standard_ceiling,
        resolved_total_ceiling,
        result,
    })
}

pub fn simulate_json(cli: Cli) -> Result<String, String> {
    let inputs = build_inputs(cli)?;
    let response = build_simulate_response(&inputs)?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to encode result: {e}"))
}

pub fn solve_json(args: SolveCli) -> Result<String, String> {
    let config = solve_config(&args);
    let inputs = build_inputs(args.scenario)?;
    let result = solve_max_expenses(&inputs, config)?;
    serde_json::to_string_pretty(&result).map_err(|e| format!("failed to encode result: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/solve", post(solve_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    log::info!("drawdown HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match build_simulate_response(&inputs) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    let (inputs, config) = match solve_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match solve_max_expenses(&inputs, config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn inputs_from_json(json: &str) -> Result<Inputs, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload)
}

fn inputs_from_payload(payload: SimulatePayload) -> Result<Inputs, String> {
    build_inputs(cli_from_payload(payload)?)
}

fn solve_request_from_payload(
    payload: SolvePayload,
) -> Result<(Inputs, ExpenseSolveConfig), String> {
    let mut config = ExpenseSolveConfig::default();
    if let Some(v) = payload.search_min {
        config.search_min = v;
    }
    if let Some(v) = payload.search_max {
        config.search_max = v;
    }
    if let Some(v) = payload.tolerance {
        config.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        config.max_iterations = v;
    }
    let inputs = inputs_from_payload(payload.scenario)?;
    Ok((inputs, config))
}

fn cli_from_payload(payload: SimulatePayload) -> Result<Cli, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.filing_status {
        cli.filing_status = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }

    if let Some(v) = payload.age {
        cli.age = v;
    }
    if let Some(v) = payload.pretax {
        cli.pretax = v;
    }
    if let Some(v) = payload.pretax_457b {
        cli.pretax_457b = v;
    }
    if let Some(v) = payload.roth {
        cli.roth = v;
    }
    if let Some(v) = payload.roth_contributions {
        cli.roth_contributions = v;
    }
    if let Some(v) = payload.rmd_start_age {
        cli.rmd_start_age = v;
    }
    if let Some(v) = payload.ss_start_age {
        cli.ss_start_age = v;
    }
    if let Some(v) = payload.ss_annual {
        cli.ss_annual = v;
    }

    if payload.spouse_age.is_some() {
        cli.spouse_age = payload.spouse_age;
    }
    if let Some(v) = payload.spouse_pretax {
        cli.spouse_pretax = v;
    }
    if let Some(v) = payload.spouse_pretax_457b {
        cli.spouse_pretax_457b = v;
    }
    if let Some(v) = payload.spouse_roth {
        cli.spouse_roth = v;
    }
    if let Some(v) = payload.spouse_roth_contributions {
        cli.spouse_roth_contributions = v;
    }
    if let Some(v) = payload.spouse_rmd_start_age {
        cli.spouse_rmd_start_age = v;
    }
    if let Some(v) = payload.spouse_ss_start_age {
        cli.spouse_ss_start_age = v;
    }
    if let Some(v) = payload.spouse_ss_annual {
        cli.spouse_ss_annual = v;
    }

    if let Some(lots) = payload.lots {
        cli.lots = lots
            .into_iter()
            .map(|lot| LotInputs {
                balance: lot.balance,
                gain: lot.gain,
            })
            .collect();
    }
    if let Some(v) = payload.cash {
        cli.cash = v;
    }

    if let Some(v) = payload.expenses {
        cli.expenses = v;
    }
    if let Some(v) = payload.expense_steps {
        cli.expense_steps = v;
    }
    if let Some(v) = payload.other_income {
        cli.other_income = v;
    }

    if let Some(v) = payload.return_rate {
        cli.return_rate = v;
    }
    if let Some(v) = payload.cash_return_rate {
        cli.cash_return_rate = v;
    }
    if let Some(v) = payload.dividend_yield {
        cli.dividend_yield = v;
    }

    if let Some(v) = payload.standard_ceiling {
        cli.standard_ceiling =
            parse_ceiling(&v).map_err(|e| format!("standardCeiling: {e}"))?;
    }
    if let Some(v) = payload.total_ceiling {
        cli.total_ceiling = parse_ceiling(&v).map_err(|e| format!("totalCeiling: {e}"))?;
    }
    if let Some(v) = payload.strategy {
        cli.strategy = v.into();
    }
    if let Some(v) = payload.prefer_457b_first {
        cli.pretax_before_457b = !v;
    }

    if payload.aca_benchmark_premium.is_some() {
        cli.aca_benchmark_premium = payload.aca_benchmark_premium;
    }
    if let Some(v) = payload.aca_household_size {
        cli.aca_household_size = v;
    }
    if let Some(v) = payload.aca_region {
        cli.aca_region = v.into();
    }
    if let Some(v) = payload.aca_end_age {
        cli.aca_end_age = v;
    }

    Ok(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        filing_status: "single".to_string(),
        years: 30,
        age: 60,
        pretax: 400_000.0,
        pretax_457b: 0.0,
        roth: 0.0,
        roth_contributions: 0.0,
        rmd_start_age: 73,
        ss_start_age: 67,
        ss_annual: 0.0,
        spouse_age: None,
        spouse_pretax: 0.0,
        spouse_pretax_457b: 0.0,
        spouse_roth: 0.0,
        spouse_roth_contributions: 0.0,
        spouse_rmd_start_age: 73,
        spouse_ss_start_age: 67,
        spouse_ss_annual: 0.0,
        lots: vec![LotInputs {
            balance: 400_000.0,
            gain: 120_000.0,
        }],
        cash: 0.0,
        expenses: 40_000.0,
        expense_steps: Vec::new(),
        other_income: Vec::new(),
        return_rate: 7.0,
        cash_return_rate: 0.0,
        dividend_yield: 0.0,
        standard_ceiling: IncomeCeiling::StandardDeduction,
        total_ceiling: IncomeCeiling::ZeroCapGainsBracket,
        strategy: CliWithdrawalStrategy::Tpm,
        pretax_before_457b: false,
        aca_benchmark_premium: None,
        aca_household_size: 1,
        aca_region: CliAcaRegion::Contiguous,
        aca_end_age: 65,
    }
}

#[cfg(test)]
fn solve_from_json(json: &str) -> Result<crate::core::ExpenseSolveResult, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    let (inputs, config) = solve_request_from_payload(payload)?;
    solve_max_expenses(&inputs, config)
}
