use crate::models::{EarningsEvent, RawRow, UNKNOWN};
use chrono::{NaiveDate, Utc};
use thiserror::Error;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₦', '₹'];
const DEFAULT_NA_TOKENS: &[&str] = &["N/A", "NA", "TBD", "--", "-", "—", ""];

// ── Financial numbers ─────────────────────────────────────────────────────────

/// Converts calendar cell text into numbers.
/// "$1.23" → 1.23 | "(1.23)" → -1.23 | "1.5B" → 1.5e9 | "N/A" → None
#[derive(Debug, Clone)]
pub struct NumberParser {
    na_tokens: Vec<String>,
}

impl NumberParser {
    pub fn new(na_tokens: &[String]) -> Self {
        Self {
            na_tokens: na_tokens.iter().map(|t| t.trim().to_uppercase()).collect(),
        }
    }

    pub fn is_not_available(&self, s: &str) -> bool {
        let s = s.trim();
        s.is_empty() || self.na_tokens.iter().any(|t| *t == s.to_uppercase())
    }

    /// Total: any input yields a finite number or `None`.
    pub fn parse(&self, s: &str) -> Option<f64> {
        if self.is_not_available(s) {
            return None;
        }

        let mut cleaned: String = s
            .trim()
            .chars()
            .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
            .collect();

        let negative = cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2;
        if negative {
            cleaned = cleaned[1..cleaned.len() - 1].to_string();
        }

        let (num_str, multiplier) = split_magnitude(&cleaned);

        // Rust accepts "inf"/"NaN"; calendar cells never mean that.
        let num: f64 = num_str.parse().ok().filter(|n: &f64| n.is_finite())?;
        let value = num * multiplier;
        if !value.is_finite() {
            return None;
        }

        Some(if negative { -value } else { value })
    }
}

impl Default for NumberParser {
    fn default() -> Self {
        let tokens: Vec<String> = DEFAULT_NA_TOKENS.iter().map(|t| t.to_string()).collect();
        Self::new(&tokens)
    }
}

fn split_magnitude(s: &str) -> (&str, f64) {
    let Some(last) = s.chars().last() else { return (s, 1.0) };
    let multiplier = match last.to_ascii_uppercase() {
        'T' => 1e12,
        'B' => 1e9,
        'M' => 1e6,
        'K' => 1e3,
        _ => return (s, 1.0),
    };
    (&s[..s.len() - last.len_utf8()], multiplier)
}

/// Parse with the default not-available tokens.
pub fn parse_financial_number(s: &str) -> Option<f64> {
    NumberParser::default().parse(s)
}

// ── Rows ──────────────────────────────────────────────────────────────────────

pub const MIN_CELLS: usize = 4;
const MAX_SYMBOL_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RowError {
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Turns one raw table row into an event.
///
/// `Ok(None)` means the row carries no event (short, blank symbol) and is
/// skipped quietly. `Err` is an extraction failure the page scraper counts.
pub trait RowParser {
    fn parse_row(&self, row: &RawRow, date: NaiveDate) -> Result<Option<EarningsEvent>, RowError>;
}

/// Symbol | Time | EPS estimate | Revenue estimate | ...
#[derive(Debug, Clone, Default)]
pub struct CalendarRowParser {
    numbers: NumberParser,
}

impl CalendarRowParser {
    pub fn new(numbers: NumberParser) -> Self {
        Self { numbers }
    }
}

impl RowParser for CalendarRowParser {
    fn parse_row(&self, row: &RawRow, date: NaiveDate) -> Result<Option<EarningsEvent>, RowError> {
        if row.cells.len() < MIN_CELLS {
            return Ok(None);
        }

        let symbol_cell = &row.cells[0];
        let symbol = symbol_cell.text.trim();
        if symbol.is_empty() {
            return Ok(None);
        }
        // A shifted layout puts names or notices in the first column.
        if symbol.len() > MAX_SYMBOL_LEN || symbol.contains(char::is_whitespace) {
            return Err(RowError::Malformed(format!("{:?} is not a ticker", symbol)));
        }

        let company_name = symbol_cell
            .link_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(symbol)
            .to_string();

        let earnings_time = match row.cells[1].text.trim() {
            "" => UNKNOWN.to_string(),
            t => t.to_string(),
        };

        let revenue_estimate = match row.cells[3].text.trim() {
            "" | "N/A" => None,
            t => Some(t.to_string()),
        };

        Ok(Some(EarningsEvent {
            symbol: symbol.to_string(),
            company_name,
            earnings_date: date,
            earnings_time,
            eps_estimate: self.numbers.parse(&row.cells[2].text),
            revenue_estimate,
            market_cap: None,
            sector: None,
            scraped_timestamp: Utc::now().naive_utc(),
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
