//! Plain-text table output for iteration and convergence logs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Value type of a table column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Double,
}

/// Writes whitespace-separated tables row by row.
///
/// Columns are declared up front; values are then written strictly in
/// column order, and the row is flushed to disk once the last column of a
/// row has been written. Writing out of order is a programming error.
#[derive(Debug)]
pub struct TableWriter {
    out: BufWriter<File>,
    columns: Vec<(String, ColumnKind)>,
    cursor: usize,
    header_written: bool,
}

impl TableWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            columns: Vec::new(),
            cursor: 0,
            header_written: false,
        })
    }

    /// Declares the next column. Must happen before the first value is
    /// written.
    pub fn add_column(&mut self, name: impl Into<String>, kind: ColumnKind) {
        assert!(!self.header_written, "columns must be declared before the first row");
        self.columns.push((name.into(), kind));
    }

    pub fn write_int(&mut self, name: &str, value: i32) -> io::Result<()> {
        self.write_cell(name, ColumnKind::Int, &value.to_string())
    }

    pub fn write_double(&mut self, name: &str, value: f64) -> io::Result<()> {
        self.write_cell(name, ColumnKind::Double, &format!("{value:.10e}"))
    }

    fn write_cell(&mut self, name: &str, kind: ColumnKind, rendered: &str) -> io::Result<()> {
        if !self.header_written {
            let header = self
                .columns
                .iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(self.out, "{header}")?;
            self.header_written = true;
        }

        let (expected_name, expected_kind) = &self.columns[self.cursor];
        assert_eq!(expected_name, name, "table values must be written in column order");
        assert_eq!(*expected_kind, kind, "column {name} has a different value type");

        if self.cursor > 0 {
            write!(self.out, "  ")?;
        }
        write!(self.out, "{rendered}")?;

        self.cursor += 1;
        if self.cursor == self.columns.len() {
            writeln!(self.out)?;
            self.out.flush()?;
            self.cursor = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iterations.log");

        let mut writer = TableWriter::create(&path).unwrap();
        writer.add_column("TimeWindow", ColumnKind::Int);
        writer.add_column("Residual", ColumnKind::Double);

        writer.write_int("TimeWindow", 1).unwrap();
        writer.write_double("Residual", 0.5).unwrap();
        writer.write_int("TimeWindow", 2).unwrap();
        writer.write_double("Residual", 0.25).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "TimeWindow  Residual");
        assert!(lines[1].starts_with("1  5.0"));
        assert!(lines[2].starts_with("2  2.5"));
    }

    #[test]
    #[should_panic(expected = "column order")]
    fn out_of_order_writes_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TableWriter::create(dir.path().join("t.log")).unwrap();
        writer.add_column("A", ColumnKind::Int);
        writer.add_column("B", ColumnKind::Int);
        writer.write_int("B", 1).unwrap();
    }
}
