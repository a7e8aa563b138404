//! In-memory listing table for programmatic use and terminal display.

use crate::listing::{Listing, COLUMNS};

/// Column-ordered snapshot of a listing set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ListingTable {
    pub fn from_listings(listings: &[Listing]) -> Self {
        Self {
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: listings.iter().map(Listing::cells).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, by name.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Columns that carry at least one value; keeps wide tables readable.
    fn populated(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&i| self.rows.iter().any(|r| !r[i].is_empty()))
            .collect()
    }

    /// Render as left-aligned text columns separated by two spaces.
    pub fn render(&self) -> String {
        let cols = if self.rows.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            self.populated()
        };

        let widths: Vec<usize> = cols
            .iter()
            .map(|&i| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(self.columns[i].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let mut push_line = |cells: Vec<&str>| {
            let line = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| format!("{cell:<w$}"))
                .collect::<Vec<_>>()
                .join("  ");
            out.push_str(line.trim_end());
            out.push('\n');
        };

        push_line(cols.iter().map(|&i| self.columns[i].as_str()).collect());
        for row in &self.rows {
            push_line(cols.iter().map(|&i| row[i].as_str()).collect());
        }
        out
    }
}
