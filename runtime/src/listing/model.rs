//! Canonical listing record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Inventory home vs. advertised floor plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Now,
    Plan,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Now => "now",
            Kind::Plan => "plan",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "now" => Ok(Kind::Now),
            "plan" => Ok(Kind::Plan),
            other => Err(format!("unknown listing kind: {other}")),
        }
    }
}

/// Column names in canonical order. JSONL keys and CSV headers follow it.
pub const COLUMNS: [&str; 20] = [
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
    "extra",
];

/// A validated, immutable listing. Built only by
/// [`build_listing`](super::build_listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub builder: String,
    pub community: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_community: Option<String>,
    pub kind: Kind,
    pub plan_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqft: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths: Option<String>,
    #[serde(default = "default_stories")]
    pub stories: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_sqft: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mls: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

fn default_stories() -> u8 {
    1
}

/// Dedup identity. `address` is `None` for plan listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub builder: String,
    pub community: String,
    pub kind: Kind,
    pub address: Option<String>,
    pub plan_name: String,
}

impl Listing {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            builder: self.builder.clone(),
            community: self.community.clone(),
            kind: self.kind,
            address: match self.kind {
                Kind::Now => self.address.clone(),
                Kind::Plan => None,
            },
            plan_name: self.plan_name.clone(),
        }
    }

    /// Ordering used for the aggregated output.
    pub fn sort_key(&self) -> (&str, Kind, &str, &str, &str) {
        (
            &self.community,
            self.kind,
            &self.builder,
            &self.plan_name,
            self.address.as_deref().unwrap_or(""),
        )
    }

    /// Cell values in [`COLUMNS`] order; absent values are empty strings.
    pub fn cells(&self) -> Vec<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(|x| x.to_string()).unwrap_or_default()
        }

        vec![
            self.builder.clone(),
            self.community.clone(),
            opt(&self.sub_community),
            self.kind.to_string(),
            self.plan_name.clone(),
            opt(&self.address),
            opt(&self.price),
            opt(&self.original_price),
            opt(&self.price_cut),
            opt(&self.sqft),
            opt(&self.beds),
            opt(&self.baths),
            self.stories.to_string(),
            opt(&self.garage),
            opt(&self.status),
            self.price_per_sqft
                .map(|p| format!("{p:.2}"))
                .unwrap_or_default(),
            opt(&self.url),
            opt(&self.image_url),
            opt(&self.mls),
            if self.extra.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&self.extra).unwrap_or_default()
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: Kind) -> Listing {
        Listing {
            builder: "Highland Homes".into(),
            community: "Cambridge".into(),
            sub_community: None,
            kind,
            plan_name: "Plan 216".into(),
            address: (kind == Kind::Now).then(|| "1 A St".to_string()),
            price: Some(400_000),
            original_price: None,
            price_cut: None,
            sqft: Some(2000),
            beds: Some("3-4".into()),
            baths: Some("2.5".into()),
            stories: 1,
            garage: Some(2),
            status: None,
            price_per_sqft: Some(200.0),
            url: None,
            image_url: None,
            mls: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("NOW".parse::<Kind>().unwrap(), Kind::Now);
        assert_eq!(" plan ".parse::<Kind>().unwrap(), Kind::Plan);
        assert!("all".parse::<Kind>().is_err());
        assert!(Kind::Now < Kind::Plan);
    }

    #[test]
    fn test_serialized_key_order_and_omission() {
        let json = serde_json::to_string(&sample(Kind::Plan)).unwrap();
        assert!(json.starts_with(r#"{"builder":"Highland Homes","community":"Cambridge","kind":"plan""#));
        assert!(!json.contains("address"));
        assert!(json.ends_with(r#""extra":{}}"#));
    }

    #[test]
    fn test_identity_key_ignores_address_for_plans() {
        let mut a = sample(Kind::Plan);
        let mut b = sample(Kind::Plan);
        a.address = None;
        b.address = Some("Plan 216".into());
        assert_eq!(a.identity_key(), b.identity_key());

        let now = sample(Kind::Now);
        assert_eq!(now.identity_key().address.as_deref(), Some("1 A St"));
    }

    #[test]
    fn test_cells_follow_columns() {
        let cells = sample(Kind::Now).cells();
        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[5], "1 A St");
        assert_eq!(cells[15], "200.00");
        assert_eq!(cells[19], "");
    }
}
