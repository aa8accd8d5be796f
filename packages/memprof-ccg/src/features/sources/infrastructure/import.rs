//! Summary import shim
//!
//! Reads a JSON-serialized whole-program summary for the summary
//! flavor. File and parse failures are reported to the caller; the
//! graph engine itself never does I/O.

use crate::errors::{MemProfError, Result};
use crate::features::sources::domain::summary::SummaryIndex;
use std::path::Path;
use tracing::info;

/// Load and validate a summary index from `path`
pub fn import_summary(path: &Path) -> Result<SummaryIndex> {
    let data = std::fs::read_to_string(path)?;
    let summary: SummaryIndex =
        serde_json::from_str(&data).map_err(|err| MemProfError::parse_error(err.to_string()))?;
    summary.validate()?;
    info!(
        functions = summary.functions.len(),
        stack_ids = summary.stack_ids.len(),
        "imported summary index"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sources::domain::summary::{FunctionSummary, MibSummary};
    use crate::shared::models::AllocationType;
    use std::io::Write;

    #[test]
    fn test_round_trips_through_json() {
        let mut index = SummaryIndex::new();
        index.stack_ids = vec![11, 22, 33];
        let mut func = FunctionSummary::new("foo");
        func.allocs.push(crate::features::sources::domain::summary::AllocRecord::new(vec![
            MibSummary {
                stack_id_indices: vec![0, 1],
                alloc_type: AllocationType::Cold,
            },
        ]));
        index.functions.push(func);

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{}", serde_json::to_string(&index).expect("serialize")).expect("write");

        let imported = import_summary(file.path()).expect("import succeeds");
        assert_eq!(imported, index);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = import_summary(Path::new("/nonexistent/summary.json")).unwrap_err();
        assert!(matches!(err, MemProfError::Io(_)));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        let err = import_summary(file.path()).unwrap_err();
        assert!(matches!(err, MemProfError::Parse(_)));
    }

    #[test]
    fn test_invalid_index_is_summary_error() {
        let mut index = SummaryIndex::new();
        index.stack_ids = vec![11];
        let mut func = FunctionSummary::new("foo");
        func.callsites.push(
            crate::features::sources::domain::summary::CallsiteRecord::new(9, vec![0]),
        );
        index.functions.push(func);

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "{}", serde_json::to_string(&index).expect("serialize")).expect("write");
        let err = import_summary(file.path()).unwrap_err();
        assert!(matches!(err, MemProfError::Summary(_)));
    }
}
