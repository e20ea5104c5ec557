//! Input helpers: encoding resolution, code page sniffing, delimiter defaults
//! and the `-` convention for stdin.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::{ReaderError, Result};

pub const DEFAULT_CSV_DELIMITER: char = ',';
pub const DEFAULT_TSV_DELIMITER: char = '\t';

/// Bytes inspected when sniffing the code page of a file.
const SNIFF_LEN: usize = 64 * 1024;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| ReaderError::configuration(format!("Unknown encoding '{value}'"))),
        None => Ok(None),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<char>) -> char {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => {
            DEFAULT_TSV_DELIMITER
        }
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Guesses the code page from the first bytes of a file.
///
/// A byte order mark wins; otherwise valid UTF-8 is taken as UTF-8 and
/// anything else as Windows-1252.
pub fn detect_code_page(head: &[u8]) -> (&'static Encoding, bool) {
    if let Some((encoding, _)) = Encoding::for_bom(head) {
        return (encoding, true);
    }
    match std::str::from_utf8(head) {
        Ok(_) => (UTF_8, false),
        // a multi-byte sequence cut at the end of the sniffed block is fine
        Err(err) if err.error_len().is_none() => (UTF_8, false),
        Err(_) => (WINDOWS_1252, false),
    }
}

pub fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ReaderError::Open {
        path: path.to_path_buf(),
        source,
    })
}

pub fn sniff_file(path: &Path) -> Result<(&'static Encoding, bool)> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    open_file(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(detect_code_page(&head))
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(open_file(path)?)))
    }
}

/// Calls `opener` until it succeeds or `should_retry` declines another attempt.
///
/// `should_retry` receives the failed attempt number (starting at 1) and the
/// error of that attempt.
pub fn open_with_retry<T, O, R>(mut opener: O, mut should_retry: R) -> Result<T>
where
    O: FnMut() -> Result<T>,
    R: FnMut(usize, &ReaderError) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match opener() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_stream_failure() && should_retry(attempt, &err) => {
                log::debug!("Retrying open after attempt {attempt}: {err}");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detect_code_page_prefers_bom() {
        let (encoding, bom) = detect_code_page(b"\xEF\xBB\xBFa,b\n");
        assert_eq!(encoding, UTF_8);
        assert!(bom);

        let (encoding, bom) = detect_code_page(b"\xFF\xFEa\x00");
        assert_eq!(encoding, encoding_rs::UTF_16LE);
        assert!(bom);
    }

    #[test]
    fn detect_code_page_falls_back_to_windows_1252() {
        assert_eq!(detect_code_page(b"caf\xe9").0, WINDOWS_1252);
        assert_eq!(detect_code_page("caf\u{e9}".as_bytes()).0, UTF_8);
        // truncated multi-byte sequence at the end of the block
        assert_eq!(detect_code_page(b"caf\xc3").0, UTF_8);
    }

    #[test]
    fn delimiter_defaults_follow_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), '\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), ',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(';')), ';');
    }

    #[test]
    fn open_with_retry_stops_when_declined() {
        let mut calls = 0;
        let result: Result<()> = open_with_retry(
            || {
                calls += 1;
                Err(ReaderError::Open {
                    path: PathBuf::from("missing.csv"),
                    source: io::Error::new(io::ErrorKind::NotFound, "gone"),
                })
            },
            |attempt, _| attempt < 3,
        );
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn open_with_retry_does_not_retry_configuration_errors() {
        let mut calls = 0;
        let result: Result<()> = open_with_retry(
            || {
                calls += 1;
                Err(ReaderError::configuration("bad"))
            },
            |_, _| true,
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
