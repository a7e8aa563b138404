//! Text → number coercion for scraped listing fields.
//!
//! All helpers are pure and accept the raw text of a card fragment, e.g.
//! `"From $389K—$420K"` or `"2½ Baths"`. Non-matching input yields `None`.

use regex::Regex;
use std::sync::LazyLock;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d[\d,]*(?:\.\d+)?)\s*([KkMm])?\b").unwrap());

static BARE_AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d[\d,]*(?:\.\d+)?)\s*([KkMm])?\s*$").unwrap());

static NOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bnow\b").unwrap());

static INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+\b|\d+").unwrap());

static SPLIT_PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*\d{1,3}(?:,\s*\d{3})+\b").unwrap());

static BEDS_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(-|to|/)\s*(\d+)").unwrap());

static BATHS_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(-|to|/)\s*(\d+(?:\.\d+)?)").unwrap()
});

static FULL_HALF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*full\D{0,12}?(\d+)\s*half").unwrap());

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Canonicalize punctuation that breaks numeric parsing.
///
/// Dashes and the minus sign become `-`, non-breaking spaces become plain
/// spaces, and `½ ¼ ¾` expand to decimals (`"2½"` → `"2.5"`).
pub fn normalize_numeric_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{a0}' | '\u{202f}' | '\u{2009}' => out.push(' '),
            '½' | '¼' | '¾' => {
                let digits = match c {
                    '½' => "5",
                    '¼' => "25",
                    _ => "75",
                };
                let trimmed = out.trim_end().len();
                if out[..trimmed].ends_with(|p: char| p.is_ascii_digit()) {
                    out.truncate(trimmed);
                    out.push('.');
                } else {
                    out.push_str("0.");
                }
                out.push_str(digits);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Rejoin dollar amounts whose thousands groups were split by whitespace
/// (`"$835, 589"`). Only `$`-anchored amounts are touched.
fn join_split_prices(text: &str) -> String {
    SPLIT_PRICE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[0].split_whitespace().collect::<String>()
        })
        .into_owned()
}

/// Parse an advertised price in USD.
///
/// Ranges collapse to the lower bound. When the text carries a reduction
/// (`"Was $500,000 Now $420,000"`) the price after "now" wins.
pub fn coerce_price(text: &str) -> Option<u64> {
    let text = join_split_prices(&normalize_numeric_text(text));

    if let Some(m) = NOW_RE.find(&text) {
        if let Some(price) = first_price(&text[m.end()..]) {
            return Some(price);
        }
    }

    first_price(&text).or_else(|| {
        let caps = BARE_AMOUNT_RE.captures(&text)?;
        scale_amount(&caps[1], caps.get(2).map(|m| m.as_str()))
    })
}

fn first_price(text: &str) -> Option<u64> {
    PRICE_RE
        .captures_iter(text)
        .find_map(|caps| scale_amount(&caps[1], caps.get(2).map(|m| m.as_str())))
}

fn scale_amount(digits: &str, suffix: Option<&str>) -> Option<u64> {
    let value: f64 = digits.replace(',', "").parse().ok()?;
    let multiplier = match suffix {
        Some("k" | "K") => 1_000.0,
        Some("m" | "M") => 1_000_000.0,
        _ => 1.0,
    };
    let scaled = (value * multiplier).round();
    (scaled >= 1.0).then_some(scaled as u64)
}

/// First integer in the text, thousands separators stripped.
pub fn coerce_int(text: &str) -> Option<u64> {
    let text = normalize_numeric_text(text);
    let m = INT_RE.find(&text)?;
    m.as_str().replace(',', "").parse().ok()
}

/// Heated area. `"2,802 - 2,822 sq ft"` → 2802.
pub fn coerce_sqft(text: &str) -> Option<u32> {
    coerce_int(text)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}

/// Bedroom count; ranges keep their form (`"3-4"`, `"3/2"`).
pub fn coerce_beds(text: &str) -> Option<String> {
    let text = normalize_numeric_text(text);
    if let Some(caps) = BEDS_RANGE_RE.captures(&text) {
        return Some(format!("{}{}{}", &caps[1], separator(&caps[2]), &caps[3]));
    }
    let m = INT_RE.find(&text)?;
    Some(m.as_str().replace(',', ""))
}

/// Bathroom count; halves kept (`"2.5"`), ranges and full/half splits
/// kept literally (`"2-3"`, `"2/1"`).
pub fn coerce_baths(text: &str) -> Option<String> {
    let text = normalize_numeric_text(text);
    if let Some(caps) = FULL_HALF_RE.captures(&text) {
        return Some(format!("{}/{}", &caps[1], &caps[2]));
    }
    if let Some(caps) = BATHS_RANGE_RE.captures(&text) {
        return Some(format!(
            "{}{}{}",
            trim_decimal(&caps[1])?,
            separator(&caps[2]),
            trim_decimal(&caps[3])?
        ));
    }
    let m = DECIMAL_RE.find(&text)?;
    trim_decimal(m.as_str())
}

fn separator(raw: &str) -> &'static str {
    if raw == "/" {
        "/"
    } else {
        "-"
    }
}

fn trim_decimal(raw: &str) -> Option<String> {
    raw.parse::<f64>().ok().map(format_decimal)
}

/// Shortest decimal rendering: `2.0` → `"2"`, `2.50` → `"2.5"`.
pub fn format_decimal(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{}", value.trunc() as i64)
    } else {
        let s = format!("{value:.2}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
