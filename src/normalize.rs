//! Field normalization for spreadsheet rows.
//!
//! Every helper here is total: malformed input yields `None` (or a best-effort
//! string), never an error, so a bad cell never stops a row from being stored.

use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9]+").expect("static header pattern is valid")
});

/// Trimmed text, or `None` for blank cells.
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strips every non-digit and keeps the result only when it is exactly 8 digits (CEP).
pub fn normalize_postal_code(raw: Option<&str>) -> Option<String> {
    let digits: String = raw?.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 8).then_some(digits)
}

/// Trims and uppercases a state code (UF).
pub fn normalize_state_code(raw: Option<&str>) -> Option<String> {
    non_blank(raw).map(|s| s.to_uppercase())
}

/// Collapses a header to the lowercase-underscore convention.
///
/// Accented characters are outside `[a-z0-9]` and collapse like punctuation,
/// so `Título do Negócio` becomes `t_tulo_do_neg_cio`.
pub fn normalize_header(raw: &str) -> String {
    NON_ALNUM
        .replace_all(&raw.to_lowercase(), "_")
        .into_owned()
}

/// Parses a monetary cell.
///
/// Accepts plain decimals (`1234.5`), Brazilian formatting (`1.234,56`) and a
/// leading currency marker (`R$`).
pub fn parse_sale_value(raw: Option<&str>) -> Option<BigDecimal> {
    let cleaned: String = raw?
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    BigDecimal::from_str(&normalized).ok()
}

/// Parses a sale date cell.
///
/// Serial 10000 is 1927-05-18.
const MIN_SERIAL_DATE: f64 = 10_000.0;
/// Serial 2958465 is 9999-12-31.
const MAX_SERIAL_DATE: f64 = 2_958_465.0;

/// Accepts `YYYY-MM-DD` (optionally followed by a time), `DD/MM/YYYY` and
/// spreadsheet serial day numbers.
pub fn parse_sale_date(raw: Option<&str>) -> Option<NaiveDate> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }

    let date_part = value
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(value);

    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%d/%m/%Y") {
        return Some(date);
    }

    // Spreadsheet serial dates count days from 1899-12-30; small numbers such
    // as a bare year are not dates
    let serial = value.parse::<f64>().ok()?;
    if !(MIN_SERIAL_DATE..=MAX_SERIAL_DATE).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Maps a normalized state code to its macro-region.
pub fn region_for_state(state: &str) -> Option<&'static str> {
    let region = match state {
        "AC" | "AP" | "AM" | "PA" | "RO" | "RR" | "TO" => "Norte",
        "AL" | "BA" | "CE" | "MA" | "PB" | "PE" | "PI" | "RN" | "SE" => "Nordeste",
        "DF" | "GO" | "MT" | "MS" => "Centro-Oeste",
        "ES" | "MG" | "RJ" | "SP" => "Sudeste",
        "PR" | "SC" | "RS" => "Sul",
        _ => return None,
    };
    Some(region)
}
