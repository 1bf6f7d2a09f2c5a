//! Calendar-date recognition for schedule text.
//!
//! Dates reach the pipeline from two directions: model output (`TANGGAL`
//! values such as `"Senin, 12 Agustus 2024"` or `"2024-08-12"`) and ledger
//! cells (typed Excel dates, serial numbers, or free text). Both are reduced
//! to a [`NaiveDate`] and rendered as `"DD MonthName YYYY"`.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Rendering used for every `TANGGAL` value.
pub const DATE_FORMAT: &str = "%d %B %Y";

const NUMERIC_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

const WEEKDAYS: &[&str] = &[
    "senin", "selasa", "rabu", "kamis", "jumat", "jum'at", "sabtu", "minggu", "ahad", "monday",
    "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon", "tue", "wed",
    "thu", "fri", "sat", "sun",
];

/// Parse a date written in any of the supported layouts.
///
/// ```rust
/// use docket_rag::dates::{format_date, parse_date};
///
/// let d = parse_date("Senin, 12 Agustus 2024").unwrap();
/// assert_eq!(format_date(d), "12 August 2024");
/// assert_eq!(parse_date("2024-08-12"), Some(d));
/// assert_eq!(parse_date("besok pagi"), None);
/// ```
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }

    let lowered = text.to_lowercase().replace(',', " ");
    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(|t| t.trim_end_matches('.'))
        .skip_while(|t| WEEKDAYS.contains(t))
        .collect();

    match tokens.as_slice() {
        [single] => NUMERIC_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(single, fmt).ok()),
        [day, month, year] => {
            let day: u32 = day.parse().ok()?;
            let month = month_number(month)?;
            let year: i32 = year.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Canonical rendering of `text` when it is a recognisable date, otherwise
/// the trimmed text unchanged.
pub fn normalize_date_text(text: &str) -> String {
    match parse_date(text) {
        Some(date) => format_date(date),
        None => text.trim().to_string(),
    }
}

/// Date of an Excel serial day number (1900 date system).
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "januari" | "january" | "jan" => 1,
        "februari" | "february" | "feb" | "pebruari" => 2,
        "maret" | "march" | "mar" => 3,
        "april" | "apr" => 4,
        "mei" | "may" => 5,
        "juni" | "june" | "jun" => 6,
        "juli" | "july" | "jul" => 7,
        "agustus" | "august" | "aug" | "agu" | "agt" | "ags" => 8,
        "september" | "sep" | "sept" => 9,
        "oktober" | "october" | "okt" | "oct" => 10,
        "november" | "nopember" | "nov" => 11,
        "desember" | "december" | "des" | "dec" => 12,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn numeric_layouts() {
        assert_eq!(parse_date("2024-08-12"), Some(ymd(2024, 8, 12)));
        assert_eq!(parse_date("12/08/2024"), Some(ymd(2024, 8, 12)));
        assert_eq!(parse_date("12-08-2024"), Some(ymd(2024, 8, 12)));
        assert_eq!(parse_date(" 2024-08-12 00:00:00 "), Some(ymd(2024, 8, 12)));
        assert_eq!(parse_date("2024-08-12T09:30:00"), Some(ymd(2024, 8, 12)));
    }

    #[test]
    fn month_names_in_both_languages() {
        assert_eq!(parse_date("5 Mei 2024"), Some(ymd(2024, 5, 5)));
        assert_eq!(parse_date("5 May 2024"), Some(ymd(2024, 5, 5)));
        assert_eq!(parse_date("17 Agt. 2024"), Some(ymd(2024, 8, 17)));
        assert_eq!(parse_date("Jumat, 1 Desember 2023"), Some(ymd(2023, 12, 1)));
        assert_eq!(parse_date("Monday 3 June 2024"), Some(ymd(2024, 6, 3)));
    }

    #[test]
    fn unrecognised_text_is_not_a_date() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("TBD"), None);
        assert_eq!(parse_date("31 Februari 2024"), None);
        assert_eq!(parse_date("12 Agustus"), None);
    }

    #[test]
    fn normalize_renders_or_keeps_text() {
        assert_eq!(normalize_date_text("2024-08-05"), "05 August 2024");
        assert_eq!(normalize_date_text("  menyusul "), "menyusul");
    }

    #[test]
    fn excel_serials() {
        assert_eq!(from_excel_serial(45516.0), Some(ymd(2024, 8, 12)));
        assert_eq!(from_excel_serial(45516.75), Some(ymd(2024, 8, 12)));
        assert_eq!(from_excel_serial(0.0), None);
        assert_eq!(from_excel_serial(f64::NAN), None);
    }
}
