//! Input text handling: reading source files and chunking them.

mod chunker;

pub use chunker::*;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Namespace;

/// Separator placed between interview transcripts merged into one document.
pub const DOCUMENT_SEPARATOR: &str = "\n\n=== separator ===\n\n";

/// Read a source file as text, replacing invalid UTF-8 sequences.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), "Input is not valid UTF-8, replacing invalid bytes");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    // Spreadsheet exports often start with a byte-order mark
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Read every input and merge them into one document for `namespace`.
///
/// Interview transcripts are joined with [`DOCUMENT_SEPARATOR`]; survey
/// exports are concatenated line-wise.
pub fn load_document(namespace: Namespace, inputs: &[PathBuf]) -> Result<String> {
    let mut parts = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = read_source(path)?;
        debug!(path = %path.display(), chars = text.chars().count(), "Read input");
        if !text.trim().is_empty() {
            parts.push(text);
        }
    }

    if parts.is_empty() {
        return Err(Error::EmptyInput(format!(
            "no text found in {} input file(s)",
            inputs.len()
        )));
    }

    let joined = match namespace {
        Namespace::Md => parts.join(DOCUMENT_SEPARATOR),
        Namespace::Csv | Namespace::Csv2 => parts
            .iter()
            .map(|p| p.trim_end_matches(['\r', '\n']))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_md_documents_joined_with_separator() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        fs::write(&a, "# Interview A").unwrap();
        fs::write(&b, "# Interview B").unwrap();

        let doc = load_document(Namespace::Md, &[a, b]).unwrap();
        assert_eq!(doc, format!("# Interview A{}# Interview B", DOCUMENT_SEPARATOR));
    }

    #[test]
    fn test_csv_bom_stripped_and_lines_joined() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "\u{feff}q1,q2\r\nyes,no\r\n").unwrap();
        fs::write(&b, "no,yes\n").unwrap();

        let doc = load_document(Namespace::Csv, &[a, b]).unwrap();
        assert_eq!(doc, "q1,q2\r\nyes,no\nno,yes");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.csv");
        fs::write(&path, [b'c', b'a', b'f', 0xe9]).unwrap();

        let text = read_source(&path).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn test_blank_inputs_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.md");
        fs::write(&path, "  \n").unwrap();

        assert!(matches!(
            load_document(Namespace::Md, &[path]),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn test_missing_input_reports_path() {
        let err = read_source(Path::new("/nonexistent/survey.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/survey.csv"));
    }
}
