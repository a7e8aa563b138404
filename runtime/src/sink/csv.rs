//! CSV with the canonical header. Absent values are empty cells and
//! `extra` is a JSON string in its own column.

use super::SinkError;
use crate::listing::{Listing, COLUMNS};
use std::io::Write;

pub fn write_csv<W: Write>(writer: W, listings: &[Listing]) -> Result<(), SinkError> {
    let mut csv = ::csv::Writer::from_writer(writer);
    csv.write_record(COLUMNS)?;
    for listing in listings {
        csv.write_record(listing.cells())?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::sample_listings;

    #[test]
    fn test_header_and_cells() {
        let mut out = Vec::new();
        write_csv(&mut out, &sample_listings()).unwrap();

        let mut reader = ::csv::Reader::from_reader(out.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, COLUMNS.to_vec());

        let rows: Vec<::csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "Highland Homes");
        assert_eq!(&rows[0][7], "");
        assert_eq!(&rows[0][11], "2.5");
        assert_eq!(&rows[0][15], "200.00");
        assert_eq!(&rows[1][19], r#"{"elevations":3}"#);
    }
}
