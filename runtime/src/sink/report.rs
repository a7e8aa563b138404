//! Run report as pretty JSON. Listings are not part of it.

use super::SinkError;
use crate::runner::RunReport;
use std::io::Write;

pub fn write_report<W: Write>(mut writer: W, report: &RunReport) -> Result<(), SinkError> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
