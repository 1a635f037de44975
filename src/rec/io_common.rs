// Primitives for reading the extracts into tables of strings.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::rec::*;

/// Reads a CSV or an Excel file (by extension) into one row per physical line.
pub fn read_table(path: &Path, delimiter: u8) -> BRecResult<Table> {
    let is_excel = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if is_excel {
        read_excel_table(path)
    } else {
        read_csv_table(path, delimiter)
    }
}

/// Blank lines are kept as empty rows: some extracts are located by line number.
pub fn read_csv_table(path: &Path, delimiter: u8) -> BRecResult<Table> {
    let path_s = path.display().to_string();
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .context(OpeningCsvSnafu {
            path: path_s.clone(),
        })?;
    let mut res: Table = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let line = line_r.context(CsvLineParseSnafu {
            path: path_s.clone(),
            lineno: idx + 1,
        })?;
        if let Some(pos) = line.position() {
            let lineno = pos.line() as usize;
            while res.len() + 1 < lineno {
                res.push(vec![String::new()]);
            }
        }
        res.push(line.iter().map(|s| s.to_string()).collect());
    }
    debug!("read_csv_table: {}: {} lines", path_s, res.len());
    Ok(res)
}

/// Reads the first worksheet.
pub fn read_excel_table(path: &Path) -> BRecResult<Table> {
    let path_s = path.display().to_string();
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
        path: path_s.clone(),
    })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu {
            path: path_s.clone(),
        })?
        .context(OpeningExcelSnafu {
            path: path_s.clone(),
        })?;

    let mut res: Table = Vec::new();
    // The used range may not start on the first line.
    if let Some((first_row, _)) = wrange.start() {
        for _ in 0..first_row {
            res.push(vec![String::new()]);
        }
    }
    for row in wrange.rows() {
        res.push(row.iter().map(cell_to_string).collect());
    }
    debug!("read_excel_table: {}: {} lines", path_s, res.len());
    Ok(res)
}

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(d) => d.to_string(),
        DataType::Error(e) => {
            warn!("cell_to_string: error cell {:?} read as empty", e);
            String::new()
        }
        _ => String::new(),
    }
}
