use crate::report::{Cell, Report, Table};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur while serializing a report.
#[derive(Debug)]
pub enum ExportError {
    /// Nothing qualified; there is nothing to write
    EmptyReport,
    /// Workbook serialization failed
    Xlsx(String),
    /// CSV serialization failed
    Csv(String),
    /// Filesystem error
    Io(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::EmptyReport => write!(f, "Report is empty"),
            ExportError::Xlsx(msg) => write!(f, "Workbook error: {}", msg),
            ExportError::Csv(msg) => write!(f, "CSV error: {}", msg),
            ExportError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<XlsxError> for ExportError {
    fn from(err: XlsxError) -> Self {
        ExportError::Xlsx(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Csv(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

/// Output format for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Single `.xlsx` workbook, one sheet per table
    Xlsx,
    /// Directory with one `.csv` file per table
    CsvDir,
}

fn write_table(worksheet: &mut Worksheet, table: &Table, header: &Format) -> Result<(), XlsxError> {
    worksheet.set_name(&table.name)?;

    for (col, name) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_num = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let col = c as u16;
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(row_num, col, s)?;
                }
                Cell::Number(v) => {
                    worksheet.write_number(row_num, col, *v)?;
                }
                Cell::Integer(v) => {
                    worksheet.write_number(row_num, col, *v as f64)?;
                }
                Cell::Empty => {}
            }
        }
    }

    Ok(())
}

fn build_workbook(report: &Report) -> Result<Workbook, ExportError> {
    if report.is_empty() {
        return Err(ExportError::EmptyReport);
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    for table in report.tables() {
        let worksheet = workbook.add_worksheet();
        write_table(worksheet, table, &header)?;
    }
    Ok(workbook)
}

/// Serializes the report as an in-memory `.xlsx` document.
pub fn to_xlsx_bytes(report: &Report) -> Result<Vec<u8>, ExportError> {
    let mut workbook = build_workbook(report)?;
    Ok(workbook.save_to_buffer()?)
}

/// Writes the report as an `.xlsx` workbook at `path`.
pub fn write_xlsx(report: &Report, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let mut workbook = build_workbook(report)?;
    workbook.save(path.as_ref())?;
    Ok(())
}

fn cell_to_field(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        Cell::Number(v) => v.to_string(),
        Cell::Integer(v) => v.to_string(),
        Cell::Empty => String::new(),
    }
}

/// Writes one `<sheet name>.csv` per table into `dir`, creating it if needed.
///
/// Returns the written paths in sheet order.
pub fn write_csv_dir(report: &Report, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ExportError> {
    if report.is_empty() {
        return Err(ExportError::EmptyReport);
    }

    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for table in report.tables() {
        let path = dir.join(format!("{}.csv", table.name));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(cell_to_field))?;
        }
        writer.flush()?;
        written.push(path);
    }

    Ok(written)
}

/// Writes the report in the requested format.
pub fn export(report: &Report, format: ExportFormat, path: impl AsRef<Path>) -> Result<(), ExportError> {
    match format {
        ExportFormat::Xlsx => write_xlsx(report, path),
        ExportFormat::CsvDir => write_csv_dir(report, path).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{build_report, QualifiedTicker};
    use crate::returns::YearlyReturn;
    use crate::statistics::TickerStatistics;
    use crate::ticker::Ticker;

    fn sample_report() -> Report {
        let ticker = Ticker::new("BRK.B").unwrap();
        build_report(vec![QualifiedTicker {
            statistics: TickerStatistics {
                ticker,
                mean: 2.5,
                median: 2.5,
                stddev: None,
                percent_positive: 100.0,
                sample_count: 2,
            },
            yearly_returns: vec![
                YearlyReturn { year: 2022, value: 2.0 },
                YearlyReturn { year: 2023, value: 3.0 },
            ],
        }])
    }

    #[test]
    fn empty_report_is_not_written() {
        assert!(matches!(to_xlsx_bytes(&Report::Empty), Err(ExportError::EmptyReport)));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            write_csv_dir(&Report::Empty, dir.path()),
            Err(ExportError::EmptyReport)
        ));
    }

    #[test]
    fn xlsx_bytes_are_a_zip_container() {
        let bytes = to_xlsx_bytes(&sample_report()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write_xlsx(&sample_report(), &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn csv_dir_has_one_file_per_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_csv_dir(&sample_report(), dir.path().join("report")).unwrap();
        assert_eq!(written.len(), 2);

        let summary = std::fs::read_to_string(&written[0]).unwrap();
        let mut lines = summary.lines();
        assert_eq!(
            lines.next(),
            Some("Ticker,Mean%,Median%,Stddev%,%PositiveYears,YearCount")
        );
        assert_eq!(lines.next(), Some("BRK-B,2.5,2.5,,100,2"));

        let detail = std::fs::read_to_string(&written[1]).unwrap();
        assert!(written[1].ends_with("BRK-B.csv"));
        assert_eq!(detail, "Year,Return%\n2022,2\n2023,3\n");
    }
}
