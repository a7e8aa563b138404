//! JSON lines: one listing object per line, keys in canonical order.

use super::SinkError;
use crate::listing::Listing;
use std::io::{BufRead, Write};

pub fn write_jsonl<W: Write>(mut writer: W, listings: &[Listing]) -> Result<(), SinkError> {
    for listing in listings {
        serde_json::to_writer(&mut writer, listing)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a JSONL stream back into listings. Blank lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<Listing>, SinkError> {
    let mut listings = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        listings.push(serde_json::from_str(&line)?);
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::sample_listings;

    #[test]
    fn test_key_order_and_omitted_fields() {
        let mut out = Vec::new();
        write_jsonl(&mut out, &sample_listings()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        assert!(lines[0].starts_with(r#"{"builder":"Highland Homes","community":"Cambridge","kind":"now","plan_name":"Plan 216","address":"1 A St","price":400000"#));
        assert!(lines[0].contains(r#""price_per_sqft":200.0"#));
        assert!(!lines[0].contains("original_price"));
        assert!(lines[1].contains(r#""stories":2"#));
        assert!(lines[1].ends_with(r#""extra":{"elevations":3}}"#));
    }

    #[test]
    fn test_read_back() {
        let listings = sample_listings();
        let mut out = Vec::new();
        write_jsonl(&mut out, &listings).unwrap();
        out.extend_from_slice(b"\n");
        let parsed = read_jsonl(out.as_slice()).unwrap();
        assert_eq!(parsed, listings);
    }
}
