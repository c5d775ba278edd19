//! ZIP archive ingestion: every CSV/Excel entry becomes its own table

use crate::error::{EngineError, Result};
use crate::ingestion::{extension, load_table, TABLE_EXTENSIONS};
use ::zip::ZipArchive;
use polars::prelude::DataFrame;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

/// Entries under this prefix are OS metadata, not user data
pub const SYSTEM_PREFIX: &str = "__MACOSX";

/// Strip any containing directories from an entry path
pub fn base_name(entry_path: &str) -> &str {
    entry_path.rsplit('/').next().unwrap_or(entry_path)
}

/// Load every readable table in the archive, in entry order. Entries that
/// fail to parse are skipped.
pub fn load_archive(bytes: &[u8]) -> Result<Vec<(String, DataFrame)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::InvalidArchive(e.to_string()))?;

    let mut results = Vec::new();
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable archive entry #{}: {}", index, e);
                continue;
            }
        };

        let path = entry.name().to_string();
        if entry.is_dir() || path.ends_with('/') || path.starts_with(SYSTEM_PREFIX) {
            continue;
        }

        let name = base_name(&path).to_string();
        if !TABLE_EXTENSIONS.contains(&extension(&name).as_str()) {
            debug!("Ignoring non-tabular archive entry {}", path);
            continue;
        }

        let mut contents = Vec::new();
        if let Err(e) = entry.read_to_end(&mut contents) {
            warn!("Skipping archive entry {}: {}", path, e);
            continue;
        }

        match load_table(&contents, &name) {
            Ok(df) => results.push((name, df)),
            Err(e) => warn!("Skipping archive entry {}: {}", path, e),
        }
    }

    if results.is_empty() {
        return Err(EngineError::EmptyArchive);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::zip::write::SimpleFileOptions;
    use ::zip::ZipWriter;
    use std::io::Write;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("data/2024/run.csv"), "run.csv");
        assert_eq!(base_name("run.csv"), "run.csv");
    }

    #[test]
    fn test_skips_metadata_directories_and_other_files() {
        let bytes = build_zip(&[
            ("nested/", b""),
            ("nested/a.csv", b"x,y\n1,2\n"),
            ("__MACOSX/nested/._a.csv", b"junk"),
            ("notes.txt", b"hello"),
        ]);
        let tables = load_archive(&bytes).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0, "a.csv");
        assert_eq!(tables[0].1.shape(), (1, 2));
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let bytes = build_zip(&[
            ("good.csv", b"a,b\n1,2\n3,4\n"),
            ("bad.csv", b"\xff\xfe\xfa,\x80\n1,2\n"),
            ("ragged.csv", b"a,b\n1,2\n3,4,5\n"),
        ]);
        let tables = load_archive(&bytes).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0, "good.csv");
    }

    #[test]
    fn test_no_tables_is_empty_archive() {
        let bytes = build_zip(&[("readme.md", b"# nothing")]);
        assert!(matches!(load_archive(&bytes), Err(EngineError::EmptyArchive)));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            load_archive(b"plain bytes"),
            Err(EngineError::InvalidArchive(_))
        ));
    }
}
