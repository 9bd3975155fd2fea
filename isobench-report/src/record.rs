//! Record Files
//!
//! Tab-separated text, one file per operation group:
//!
//! ```text
//! #------------ <title> ------------
//! #<col1>\t<col2>\t...\t<colN>
//! <row1col1>\t<row1col2>\t...
//! ```
//!
//! Comment lines start with `#` and are written once, when the file is
//! created. Only the lines before the first data row are comments, so a data
//! cell may itself start with `#`. Without headers nothing marks where the
//! comments end, and a first row starting with `#` reads back as a header. Every record is flushed as soon as it is written so that a worker
//! process dying mid-group keeps the rows it already produced.

use crate::ReportError;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const TITLE_DECORATION: &str = "------------";

/// Writer for one record file
pub struct RecordWriter<W: Write = File> {
    writer: BufWriter<W>,
    rows: usize,
}

impl RecordWriter<File> {
    /// Create (or truncate) the file at `path`, creating parent directories,
    /// and write the comment header.
    pub fn create(
        path: impl AsRef<Path>,
        title: Option<&str>,
        headers: &[String],
    ) -> Result<Self, ReportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Self::with_header(file, title, headers)
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wrap `inner` and write the comment header.
    ///
    /// Nothing is written when `headers` is empty; the title is only written
    /// together with a header line.
    pub fn with_header(inner: W, title: Option<&str>, headers: &[String]) -> Result<Self, ReportError> {
        let mut writer = Self {
            writer: BufWriter::new(inner),
            rows: 0,
        };

        if !headers.is_empty() {
            if let Some(title) = title.filter(|t| !t.is_empty()) {
                writeln!(
                    writer.writer,
                    "#{TITLE_DECORATION} {} {TITLE_DECORATION}",
                    sanitize(title)
                )?;
            }
            let line = headers
                .iter()
                .map(|h| sanitize(h))
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(writer.writer, "#{line}")?;
            writer.writer.flush()?;
        }

        Ok(writer)
    }

    /// Append one data row and flush it
    pub fn write_record<I, T>(&mut self, columns: I) -> Result<(), ReportError>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let line = columns
            .into_iter()
            .map(|c| sanitize(&c.to_string()))
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer
    pub fn finish(self) -> Result<W, ReportError> {
        self.writer
            .into_inner()
            .map_err(|e| ReportError::Io(e.into_error()))
    }
}

/// Field separators inside a value would shift every following column.
fn sanitize(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Parsed content of a record file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFile {
    /// Title from the decorated title line, if present
    pub title: Option<String>,
    /// Column names from the header line
    pub headers: Vec<String>,
    /// Data rows in file order
    pub rows: Vec<Vec<String>>,
}

/// Read a record file back into its title, headers and rows
pub fn read_records(path: impl AsRef<Path>) -> Result<RecordFile, ReportError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_records(&content)
}

fn parse_records(content: &str) -> Result<RecordFile, ReportError> {
    let mut file = RecordFile::default();
    let mut in_header = true;

    for (index, line) in content.lines().enumerate() {
        // Comment lines only open the file; past the header every line is data
        if in_header {
            if let Some(comment) = line.strip_prefix('#') {
                match comment
                    .strip_prefix(TITLE_DECORATION)
                    .and_then(|rest| rest.strip_suffix(TITLE_DECORATION))
                {
                    Some(title) if file.title.is_none() => {
                        file.title = Some(title.trim().to_string());
                    }
                    _ => {
                        file.headers = comment.split('\t').map(str::to_string).collect();
                        in_header = false;
                    }
                }
                continue;
            }
            in_header = false;
        }

        let row: Vec<String> = line.split('\t').map(str::to_string).collect();
        if !file.headers.is_empty() && row.len() != file.headers.len() {
            return Err(ReportError::Malformed {
                line: index + 1,
                message: format!(
                    "expected {} columns, found {}",
                    file.headers.len(),
                    row.len()
                ),
            });
        }
        file.rows.push(row);
    }

    Ok(file)
}
