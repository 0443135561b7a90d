//! Tolerant line-by-line CSV reader
//!
//! Each physical line is decoded on its own, so a broken line never affects
//! the lines after it. Decoding is lenient: field counts may vary from line
//! to line and stray quotes are kept as literal text.
//!
//! The first non-empty, decodable line becomes the header row; every later
//! valid line becomes a data row.
//!
//! Lines end at `\n` only. A bare `\r` is ordinary field text. At most
//! [`MAX_LINE_BYTES`] (plus the line ending) of a line is ever buffered; the
//! rest of an overlong line is skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Lines longer than this are counted as malformed
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Why a single line did not produce a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("empty line")]
    Empty,

    #[error("malformed line: {0}")]
    Malformed(String),
}

/// Counters collected while reading a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Physical lines seen
    pub lines: usize,
    /// Blank or whitespace-only lines skipped
    pub empty_lines: usize,
    /// Lines that failed to decode
    pub malformed_lines: usize,
}

impl ReadStats {
    /// Total lines skipped for any reason
    pub fn skipped(&self) -> usize {
        self.empty_lines + self.malformed_lines
    }
}

/// Header plus data rows, before any protocol transform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub stats: ReadStats,
    /// Line number and reason of the first few malformed lines
    pub malformed_samples: Vec<(usize, String)>,
}

/// Row and column counts of a file, as shown in listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    /// Valid lines, header included
    pub row_count: usize,
    /// Field count of the first valid line
    pub column_count: usize,
}

const MAX_MALFORMED_SAMPLES: usize = 10;

/// Decode one line into its fields
///
/// A trailing `\n` or `\r\n` is ignored. Whitespace-only lines are
/// [`LineError::Empty`]; lines that are not UTF-8, are too long, or yield no
/// record are [`LineError::Malformed`].
pub fn parse_line(line: &[u8]) -> Result<Vec<String>, LineError> {
    let line = trim_line_ending(line);

    if line.len() > MAX_LINE_BYTES {
        return Err(LineError::Malformed(format!(
            "line exceeds {} bytes",
            MAX_LINE_BYTES
        )));
    }

    let text = std::str::from_utf8(line)
        .map_err(|e| LineError::Malformed(format!("invalid UTF-8: {}", e)))?;

    if text.trim().is_empty() {
        return Err(LineError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .buffer_capacity(text.len().max(64))
        .from_reader(text.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_string).collect()),
        Ok(false) => Err(LineError::Malformed("no record".to_string())),
        Err(e) => Err(LineError::Malformed(e.to_string())),
    }
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    line
}

/// Read a whole stream into a [`RawTable`]
pub fn read_table<R: Read>(source: R) -> std::io::Result<RawTable> {
    let mut table = RawTable::default();
    let mut header_seen = false;

    for_each_line(source, |line_number, parsed| {
        table.stats.lines += 1;
        match parsed {
            Ok(fields) if !header_seen => {
                table.headers = fields;
                header_seen = true;
            }
            Ok(fields) => table.rows.push(fields),
            Err(LineError::Empty) => table.stats.empty_lines += 1,
            Err(LineError::Malformed(reason)) => {
                table.stats.malformed_lines += 1;
                if table.malformed_samples.len() < MAX_MALFORMED_SAMPLES {
                    table.malformed_samples.push((line_number, reason));
                }
            }
        }
    })?;

    Ok(table)
}

/// Open and read a file into a [`RawTable`]
pub fn read_file(path: &Path) -> std::io::Result<RawTable> {
    log::debug!("Reading CSV file: {:?}", path);
    let file = File::open(path)?;
    read_table(file)
}

/// Count valid lines and the column count of the first one
pub fn summarize_file(path: &Path) -> std::io::Result<FileSummary> {
    let file = File::open(path)?;
    let mut summary = FileSummary::default();
    let mut skipped = 0usize;

    for_each_line(file, |_, parsed| match parsed {
        Ok(fields) => {
            if summary.row_count == 0 {
                summary.column_count = fields.len();
            }
            summary.row_count += 1;
        }
        Err(_) => skipped += 1,
    })?;

    if skipped > 0 {
        log::debug!("Summarized {:?}, skipped {} invalid lines", path, skipped);
    }
    Ok(summary)
}

/// Feed every physical line (1-based number, decode result) to `visit`
fn for_each_line<R, F>(source: R, mut visit: F) -> std::io::Result<()>
where
    R: Read,
    F: FnMut(usize, Result<Vec<String>, LineError>),
{
    // Room for a maximal line plus `\r\n`
    let limit = MAX_LINE_BYTES as u64 + 2;
    let mut reader = BufReader::with_capacity(64 * 1024, source);
    let mut buf = Vec::with_capacity(1024);
    let mut line_number = 0usize;

    loop {
        buf.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        line_number += 1;

        if read as u64 == limit && buf.last() != Some(&b'\n') {
            skip_rest_of_line(&mut reader)?;
            visit(
                line_number,
                Err(LineError::Malformed(format!("line exceeds {} bytes", MAX_LINE_BYTES))),
            );
            continue;
        }

        visit(line_number, parse_line(&buf));
    }

    Ok(())
}

/// Discard input up to and including the next `\n`, one buffer at a time
fn skip_rest_of_line<R: BufRead>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
