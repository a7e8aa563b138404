//! Raw record → validated [`Listing`].

use super::coerce::{coerce_baths, coerce_beds, coerce_int, coerce_price, coerce_sqft, format_decimal};
use super::model::{Kind, Listing};
use super::raw::{RawRecord, EXTRA_KEY};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a raw record was refused by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unrecognized listing kind `{0}`")]
    InvalidKind(String),
    #[error("`now` listing without an address")]
    MissingAddress,
    #[error("plan listing without a plan name")]
    MissingPlanName,
}

impl Rejection {
    /// Stable tally key.
    pub fn reason(&self) -> String {
        match self {
            Rejection::MissingField(field) => format!("missing_{field}"),
            Rejection::InvalidKind(_) => "invalid_kind".to_string(),
            Rejection::MissingAddress => "missing_address".to_string(),
            Rejection::MissingPlanName => "missing_plan_name".to_string(),
        }
    }
}

const KNOWN_FIELDS: [&str; 20] = [
    "builder",
    "community",
    "sub_community",
    "kind",
    "plan_name",
    "address",
    "price",
    "original_price",
    "price_cut",
    "sqft",
    "beds",
    "baths",
    "stories",
    "garage",
    "status",
    "price_per_sqft",
    "url",
    "image_url",
    "mls",
    EXTRA_KEY,
];

/// Validate and coerce a raw record.
///
/// `builder`, `community` and `kind` must already be present; the
/// normalizer injects them from the recipe descriptor. Unknown keys are
/// folded into `extra`; a supplied `price_per_sqft` is ignored and
/// recomputed.
pub fn build_listing(raw: &RawRecord) -> Result<Listing, Rejection> {
    let builder = raw.text("builder").ok_or(Rejection::MissingField("builder"))?;
    let community = raw
        .text("community")
        .ok_or(Rejection::MissingField("community"))?;
    let kind_text = raw.text("kind").ok_or(Rejection::MissingField("kind"))?;
    let kind: Kind = kind_text
        .parse()
        .map_err(|_| Rejection::InvalidKind(kind_text.clone()))?;

    let mut extra = collect_extra(raw);

    let mut address = raw.text("address");
    let plan_name = match kind {
        Kind::Now => {
            let addr = address.clone().ok_or(Rejection::MissingAddress)?;
            raw.text("plan_name").unwrap_or(addr)
        }
        Kind::Plan => raw.text("plan_name").ok_or(Rejection::MissingPlanName)?,
    };
    if kind == Kind::Plan {
        if let Some(addr) = address.take() {
            if addr == plan_name {
                address = Some(addr);
            } else {
                extra.insert("address".to_string(), Value::String(addr));
            }
        }
    }

    let price = raw.get("price").and_then(price_value);
    let original_price = raw
        .get("original_price")
        .and_then(price_value)
        .filter(|orig| price.is_some_and(|p| *orig > p));

    let sqft = raw.get("sqft").and_then(|v| match v {
        Value::Number(n) => n
            .as_f64()
            .map(f64::round)
            .filter(|f| *f >= 1.0 && *f <= u32::MAX as f64)
            .map(|f| f as u32),
        Value::String(s) => coerce_sqft(s),
        _ => None,
    });

    let beds = raw.get("beds").and_then(|v| match v {
        Value::Number(n) => n.as_f64().filter(|f| *f >= 0.0).map(format_decimal),
        Value::String(s) => coerce_beds(s),
        _ => None,
    });
    let baths = raw.get("baths").and_then(|v| match v {
        Value::Number(n) => n.as_f64().filter(|f| *f >= 0.0).map(format_decimal),
        Value::String(s) => coerce_baths(s),
        _ => None,
    });

    let stories = raw
        .get("stories")
        .and_then(small_int)
        .filter(|n| *n > 0)
        .unwrap_or(1);
    let garage = raw.get("garage").and_then(small_int);

    Ok(Listing {
        builder,
        community,
        sub_community: raw.text("sub_community"),
        kind,
        plan_name,
        address,
        price,
        original_price,
        price_cut: raw.text("price_cut"),
        sqft,
        beds,
        baths,
        stories,
        garage,
        status: raw.text("status"),
        price_per_sqft: price_per_sqft(price, sqft),
        url: raw.text("url").filter(|u| is_absolute_url(u)),
        image_url: raw.text("image_url").filter(|u| is_absolute_url(u)),
        mls: raw.text("mls"),
        extra,
    })
}

/// `round(price / sqft, 2)`; `None` when either input is absent or zero.
pub fn price_per_sqft(price: Option<u64>, sqft: Option<u32>) -> Option<f64> {
    match (price, sqft) {
        (Some(p), Some(s)) if s > 0 => Some((p as f64 / s as f64 * 100.0).round() / 100.0),
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(f64::round)
            .filter(|f| *f >= 1.0)
            .map(|f| f as u64),
        Value::String(s) => coerce_price(s),
        _ => None,
    }
}

fn small_int(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64().map(|f| f.floor()).filter(|f| *f >= 0.0)? as u64,
        Value::String(s) => coerce_int(s)?,
        _ => return None,
    };
    u8::try_from(n).ok()
}

fn is_absolute_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn collect_extra(raw: &RawRecord) -> BTreeMap<String, Value> {
    let mut extra = BTreeMap::new();
    if let Some(Value::Object(map)) = raw.get(EXTRA_KEY) {
        for (k, v) in map {
            extra.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in raw.iter() {
        if !KNOWN_FIELDS.contains(&k.as_str()) {
            extra.insert(k.clone(), v.clone());
        }
    }
    extra
}
