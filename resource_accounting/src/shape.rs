// Locating fields in loosely structured extracts.

use log::debug;
use snafu::OptionExt;

use crate::{AccountingResult, MissingColumnSnafu, RowTooShortSnafu};

/// A table as handed over by the readers: one vector of cells per physical line.
pub type Table = Vec<Vec<String>>;

/// Removes the quoting and padding that some exporters leave in the cells.
pub fn clean_cell(cell: &str) -> String {
    cell.trim_matches(|c: char| c == '\r' || c == '\n')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// The shape of the rows of an extract, learned once from its header line.
///
/// Some extracts contain free-text fields with unescaped separators. Those
/// rows are wider than the header. The cells left of the free-text column
/// are at their nominal position, the cells right of it are shifted by the
/// excess width of the row.
#[derive(Debug, Clone)]
pub struct RecordShape {
    extract: String,
    header: Vec<String>,
    drift_from: usize,
}

impl RecordShape {
    /// `drift_from`: the first column index affected by the excess width.
    pub fn new(extract: &str, header: &[String], drift_from: usize) -> RecordShape {
        let header: Vec<String> = header.iter().map(|s| clean_cell(s)).collect();
        debug!("RecordShape::new: {}: header: {:?}", extract, header);
        RecordShape {
            extract: extract.to_string(),
            header,
            drift_from,
        }
    }

    /// The index of the header cell equal to `name` (after cleaning).
    pub fn column(&self, name: &str) -> AccountingResult<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .context(MissingColumnSnafu {
                extract: self.extract.clone(),
                column: name.to_string(),
            })
    }

    /// The index of the first header cell containing `fragment`.
    pub fn column_containing(&self, fragment: &str) -> AccountingResult<usize> {
        self.header
            .iter()
            .position(|h| h.contains(fragment))
            .context(MissingColumnSnafu {
                extract: self.extract.clone(),
                column: fragment.to_string(),
            })
    }

    /// The physical position of the nominal column `col` in `row`.
    pub fn position(&self, row: &[String], col: usize) -> usize {
        if col >= self.drift_from && row.len() > self.header.len() {
            col + (row.len() - self.header.len())
        } else {
            col
        }
    }

    /// The cleaned cell of `row` at nominal column `col`.
    pub fn get(&self, row: &[String], col: usize, lineno: usize) -> AccountingResult<String> {
        let pos = self.position(row, col);
        row.get(pos).map(|s| clean_cell(s)).context(RowTooShortSnafu {
            extract: self.extract.clone(),
            lineno,
            column: pos,
        })
    }
}

/// Lenient numeric parsing: blank cells count as zero.
pub fn parse_number(cell: &str) -> Option<f64> {
    let c = clean_cell(cell);
    if c.is_empty() {
        Some(0.0)
    } else {
        c.parse::<f64>().ok()
    }
}
