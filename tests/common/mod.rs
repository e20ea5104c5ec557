#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_typed::{
    options::ReaderOptions,
    reader::CsvReader,
    warning::{Warning, WarningList, WarningSink},
};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

/// Reads every record of `reader`, returning raw cells and all warnings
/// raised along the way.
pub fn read_all(reader: &mut CsvReader, warnings: &mut WarningList) -> Vec<Vec<Option<String>>> {
    let mut rows = Vec::new();
    while reader.read_next_record(warnings).expect("read record") {
        rows.push(reader.raw_record().expect("current record").to_vec());
    }
    rows
}

/// Opens `text` and reads it to the end.
pub fn read_text(
    text: &str,
    options: ReaderOptions,
) -> (CsvReader, Vec<Vec<Option<String>>>, WarningList) {
    let mut warnings = WarningList::new();
    let mut reader = CsvReader::from_text(text, options, &[], &mut warnings).expect("open reader");
    let rows = read_all(&mut reader, &mut warnings);
    (reader, rows, warnings)
}

/// Raw cells as the reader stores them for a row of full width.
pub fn cells(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

/// Counts warnings without keeping them.
#[derive(Default)]
pub struct CountingSink(pub usize);

impl WarningSink for CountingSink {
    fn on_warning(&mut self, _warning: &Warning) {
        self.0 += 1;
    }
}
