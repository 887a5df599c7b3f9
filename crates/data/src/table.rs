//! Minimal numeric CSV tables.
//!
//! Measurement files are written with a leading row-index column, a header row
//! and purely numeric cells. Empty and `nan` cells load as NaN.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, ArrayView1, Axis};
use std::io;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Table {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            bail!(
                "table has {} column names but {} value columns",
                columns.len(),
                values.ncols()
            );
        }
        Ok(Self { columns, values })
    }

    /// Read a CSV file, skipping its first (index) column. `nrows` limits the
    /// number of data rows read.
    pub fn read_csv(path: &Path, nrows: Option<usize>) -> Result<Self> {
        let reader = csv_reader()
            .from_path(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_records(reader, nrows).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse_csv(text: &str, nrows: Option<usize>) -> Result<Self> {
        Self::from_records(csv_reader().from_reader(text.as_bytes()), nrows)
    }

    fn from_records<R: io::Read>(mut reader: csv::Reader<R>, nrows: Option<usize>) -> Result<Self> {
        let header = reader.headers()?;
        if header.is_empty() {
            bail!("missing header row");
        }
        let columns: Vec<String> = header.iter().skip(1).map(|name| name.trim().to_string()).collect();
        if columns.is_empty() {
            bail!("header row has no data columns");
        }

        let mut data = Vec::new();
        let mut n_rows = 0;
        for (row_idx, record) in reader.records().take(nrows.unwrap_or(usize::MAX)).enumerate() {
            let record = record.with_context(|| format!("row {}", row_idx + 1))?;
            let cells = record.len().saturating_sub(1);
            if cells != columns.len() {
                bail!(
                    "row {} has {} cells, expected {}",
                    row_idx + 1,
                    cells,
                    columns.len()
                );
            }
            for (cell, column) in record.iter().skip(1).zip(&columns) {
                data.push(parse_cell(cell).ok_or_else(|| {
                    anyhow!(
                        "row {} column {column:?}: cannot parse {cell:?} as a number",
                        row_idx + 1
                    )
                })?);
            }
            n_rows += 1;
        }

        let values = Array2::from_shape_vec((n_rows, columns.len()), data)?;
        Self::new(columns, values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| anyhow!("missing column {name:?}"))?;
        Ok(self.values.column(idx))
    }

    /// Copy of the table without the named columns. Names that are not present
    /// are ignored.
    pub fn without_columns(&self, names: &[&str]) -> Table {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&idx| !names.contains(&self.columns[idx].as_str()))
            .collect();
        Table {
            columns: keep.iter().map(|&idx| self.columns[idx].clone()).collect(),
            values: self.values.select(Axis(1), &keep),
        }
    }

    /// Column-wise concatenation of two tables with the same row count.
    pub fn concat(&self, other: &Table) -> Result<Table> {
        if self.nrows() != other.nrows() {
            bail!(
                "cannot concatenate tables with {} and {} rows",
                self.nrows(),
                other.nrows()
            );
        }
        let values = ndarray::concatenate(Axis(1), &[self.values.view(), other.values.view()])?;
        let columns = self
            .columns
            .iter()
            .chain(&other.columns)
            .cloned()
            .collect();
        Table::new(columns, values)
    }

    pub fn into_parts(self) -> (Vec<String>, Array2<f64>) {
        (self.columns, self.values)
    }
}

/// Rows may be ragged; the cell count is checked per row.
fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).flexible(true);
    builder
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    match cell {
        "True" | "true" => Some(1.0),
        "False" | "false" => Some(0.0),
        _ => cell.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
,m,n,k,perf (Gflop/s)
0,4,4,4,12.5
1,4,4,4,
2,8,8,8,nan
3,8,8,8,40
";

    #[test]
    fn test_parse_skips_index_column() {
        let table = Table::parse_csv(SAMPLE, None).unwrap();
        assert_eq!(table.columns(), &["m", "n", "k", "perf (Gflop/s)"]);
        assert_eq!(table.nrows(), 4);
        assert_eq!(table.column("k").unwrap()[3], 8.0);
    }

    #[test]
    fn test_missing_cells_load_as_nan() {
        let table = Table::parse_csv(SAMPLE, None).unwrap();
        let perf = table.column("perf (Gflop/s)").unwrap();
        assert!(perf[1].is_nan());
        assert!(perf[2].is_nan());
        assert_eq!(perf[3], 40.0);
    }

    #[test]
    fn test_row_limit() {
        let table = Table::parse_csv(SAMPLE, Some(2)).unwrap();
        assert_eq!(table.nrows(), 2);
    }

    #[test]
    fn test_garbage_cell_is_an_error() {
        let err = Table::parse_csv(",a\n0,oops\n", None).unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        assert!(Table::parse_csv(",a,b\n0,1\n", None).is_err());
    }

    #[test]
    fn test_quoted_fields() {
        let table = Table::parse_csv(",\"m,n\",b\n0,\"1.5\",2\n1,\" 3 \",True\n", None).unwrap();
        assert_eq!(table.columns(), &["m,n", "b"]);
        assert_eq!(table.nrows(), 2);
        assert_eq!(table.column("m,n").unwrap().to_vec(), vec![1.5, 3.0]);
        assert_eq!(table.column("b").unwrap().to_vec(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_read_csv_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let table = Table::read_csv(&path, Some(3)).unwrap();
        assert_eq!(table.nrows(), 3);
        assert!(Table::read_csv(&dir.path().join("absent.csv"), None).is_err());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(Table::parse_csv("", None).is_err());
        assert!(Table::parse_csv("index\n0\n", None).is_err());
    }

    #[test]
    fn test_without_columns_and_concat() {
        let table = Table::parse_csv(SAMPLE, None).unwrap();
        let dims = table.without_columns(&["perf (Gflop/s)", "absent"]);
        assert_eq!(dims.columns(), &["m", "n", "k"]);

        let perf = table.without_columns(&["m", "n", "k"]);
        let joined = dims.concat(&perf).unwrap();
        assert_eq!(joined.columns().len(), 4);
        assert_eq!(joined.values()[[3, 3]], 40.0);
    }
}
