//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Rows become [`SourceRecord`]s keyed by header; converted rows are
//! written back in destination column order. No mapping logic here.

use std::io::Write;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{DestinationRecord, DestinationSpec, SourceRecord, SourceSpec};

/// Delimiters tried by [`detect_delimiter`], in tie-break order.
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Result of parsing with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    /// One record per non-empty data line
    pub records: Vec<SourceRecord>,
    /// Column headers, in file order. These are the record keys.
    pub headers: Vec<String>,
    /// Header line as written in the file, before any spec renames.
    /// Empty when the file has no header line.
    pub file_headers: Vec<String>,
    /// Physical line (1-based) where each record starts.
    pub line_numbers: Vec<u64>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(b"\xEF\xBB\xBF") || std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
///
/// A UTF-8 byte order mark is dropped. Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" | "iso-8859-15" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(encoding) => encoding.decode(bytes).0.into_owned(),
            None => {
                tracing::warn!(encoding = other, "Unknown encoding, decoding as UTF-8");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Defaults to `,` when none of the candidates appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = DELIMITERS[0];
    let mut best_count = 0;

    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn delimiter_byte(delimiter: char) -> CsvResult<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CsvError::Parse {
            line: 0,
            message: format!("Delimiter '{}' is not a single ASCII character", delimiter),
        })
}

/// Parse CSV text with a header line and an explicit delimiter.
///
/// Short rows are padded with empty values; extra values are ignored.
///
/// # Example
/// ```
/// use converter::parser::parse_str;
///
/// let result = parse_str("name;age\nAlice;30\nBob;25", ';').unwrap();
///
/// assert_eq!(result.records.len(), 2);
/// assert_eq!(result.records[0]["name"], "Alice");
/// assert_eq!(result.records[1]["age"], "25");
/// ```
pub fn parse_str(content: &str, delimiter: char) -> CsvResult<ParseResult> {
    parse_content(content, delimiter, None, "utf-8".to_string())
}

fn parse_content(
    content: &str,
    delimiter: char,
    headers: Option<Vec<String>>,
    encoding: String,
) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .has_headers(headers.is_none())
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let (headers, file_headers) = match headers {
        Some(headers) => (headers, Vec::new()),
        None => {
            let read: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            (read.clone(), read)
        }
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut records = Vec::new();
    let mut line_numbers = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let record: SourceRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string()))
            .collect();
        line_numbers.push(row.position().map_or(0, csv::Position::line));
        records.push(record);
    }

    tracing::debug!(
        records = records.len(),
        columns = headers.len(),
        delimiter = %delimiter.escape_default(),
        "Parsed CSV"
    );

    Ok(ParseResult {
        records,
        headers,
        file_headers,
        line_numbers,
        encoding,
        delimiter,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    parse_content(&content, delimiter, None, encoding)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV bytes described by a source spec.
///
/// Encoding and delimiter are still detected. Without a header line the
/// spec's column names are used; columns with a `source_name` are renamed
/// to their spec name.
pub fn parse_bytes_for(bytes: &[u8], spec: &SourceSpec) -> CsvResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    let headers = (!spec.has_header).then(|| spec.column_names());
    let mut result = parse_content(&content, delimiter, headers, encoding)?;
    rename_source_columns(&mut result, spec);
    Ok(result)
}

/// Parse a CSV file described by a source spec.
pub fn parse_file_for<P: AsRef<Path>>(path: P, spec: &SourceSpec) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_for(&bytes, spec)
}

impl ParseResult {
    /// Physical file line of a record. Differs from the reported line
    /// number once blank lines or multi-line quoted cells precede it.
    pub fn physical_line(&self, row_index: usize) -> Option<u64> {
        self.line_numbers.get(row_index).copied()
    }

    /// Write `records` back in the layout they were read from: same header
    /// line (original column names, or none), same delimiter.
    pub fn write_back<W: Write>(&self, writer: W, records: &[SourceRecord]) -> CsvResult<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(delimiter_byte(self.delimiter)?)
            .from_writer(writer);

        if !self.file_headers.is_empty() {
            csv_writer.write_record(&self.file_headers)?;
        }
        for record in records {
            csv_writer.write_record(
                self.headers
                    .iter()
                    .map(|h| record.get(h).map(String::as_str).unwrap_or("")),
            )?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn rename_source_columns(result: &mut ParseResult, spec: &SourceSpec) {
    for column in &spec.columns {
        let Some(original) = column.source_name.as_deref() else {
            continue;
        };
        if original == column.name {
            continue;
        }
        let Some(header) = result.headers.iter_mut().find(|h| h.as_str() == original) else {
            continue;
        };
        *header = column.name.clone();
        for record in &mut result.records {
            if let Some(value) = record.remove(original) {
                record.insert(column.name.clone(), value);
            }
        }
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Output header: destination columns, then any extra record columns.
pub fn output_headers(destination: &DestinationSpec, records: &[DestinationRecord]) -> Vec<String> {
    let mut headers = destination.column_names();
    for record in records {
        for column in record.columns() {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
    }
    headers
}

/// Write converted records as CSV.
pub fn write_records<W: Write>(
    writer: W,
    headers: &[String],
    records: &[DestinationRecord],
    delimiter: char,
) -> CsvResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(writer);

    csv_writer.write_record(headers)?;
    for record in records {
        csv_writer.write_record(headers.iter().map(|h| record.get(h).unwrap_or("")))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write converted records to `path` in the destination's format.
pub fn write_file<P: AsRef<Path>>(
    path: P,
    destination: &DestinationSpec,
    records: &[DestinationRecord],
) -> CsvResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path.as_ref())?;
    let headers = output_headers(destination, records);
    write_records(file, &headers, records, destination.delimiter)
}
