//! Output of the merged listing table and the run report.
//!
//! Listings go to the data stream in one of three formats. The report is
//! always written separately so the data stream stays machine-readable.

pub mod csv;
pub mod jsonl;
pub mod report;
pub mod table;

pub use self::csv::write_csv;
pub use jsonl::{read_jsonl, write_jsonl};
pub use report::write_report;
pub use table::ListingTable;

use crate::listing::Listing;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Csv,
    Table,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            "table" => Ok(OutputFormat::Table),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Write `listings` to `writer` in `format`.
pub fn write_listings<W: Write>(
    format: OutputFormat,
    listings: &[Listing],
    mut writer: W,
) -> Result<(), SinkError> {
    match format {
        OutputFormat::Jsonl => write_jsonl(&mut writer, listings),
        OutputFormat::Csv => write_csv(&mut writer, listings),
        OutputFormat::Table => {
            let table = ListingTable::from_listings(listings);
            writer.write_all(table.render().as_bytes())?;
            writer.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::listing::{build_listing, Listing, RawRecord};

    pub fn sample_listings() -> Vec<Listing> {
        let now = RawRecord::new()
            .with("builder", "Highland Homes")
            .with("community", "Cambridge")
            .with("kind", "now")
            .with("plan_name", "Plan 216")
            .with("address", "1 A St")
            .with("price", "$400,000")
            .with("sqft", "2,000")
            .with("beds", "3-4")
            .with("baths", "2½")
            .with("url", "https://www.highlandhomes.com/dfw/celina/cambridge/1-a-st");
        let mut plan = RawRecord::new()
            .with("builder", "Perry Homes")
            .with("community", "Elevon")
            .with("kind", "plan")
            .with("plan_name", "2450W")
            .with("price", "From $389K")
            .with("stories", 2);
        plan.set_extra("elevations", 3);
        vec![
            build_listing(&now).unwrap(),
            build_listing(&plan).unwrap(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert_eq!("jsonl".parse::<OutputFormat>(), Ok(OutputFormat::Jsonl));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_write_table_format() {
        let mut out = Vec::new();
        write_listings(OutputFormat::Table, &testing::sample_listings(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("builder"));
        assert!(text.contains("Highland Homes"));
    }
}
