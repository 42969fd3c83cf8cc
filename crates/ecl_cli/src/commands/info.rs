//! Info command implementation.

use super::open_backend;
use serde::Serialize;
use std::path::Path;

/// Changelog summary, as published in the root DSE.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Dump the changelog was loaded from.
    pub input: String,
    /// Retained replica changes.
    pub changes: usize,
    /// Indexed changes.
    pub indexed_changes: usize,
    /// Root DSE attributes of the changelog.
    pub attributes: Vec<(String, String)>,
}

/// Summarizes the changelog in `input` as text or JSON.
pub fn run(input: &Path, exclude: &[String], json: bool) -> Result<String, Box<dyn std::error::Error>> {
    let backend = open_backend(input, exclude)?;
    let result = InfoResult {
        input: input.display().to_string(),
        changes: backend.db().replica_db().len(),
        indexed_changes: backend.db().cn_index_db().len(),
        attributes: backend
            .root_dse_attributes()
            .into_iter()
            .map(|a| {
                let value = a.first_value().unwrap_or_default().to_string();
                (a.name, value)
            })
            .collect(),
    };

    if json {
        return Ok(serde_json::to_string_pretty(&result)?);
    }
    let mut text = String::new();
    text.push_str("External Changelog\n");
    text.push_str("==================\n\n");
    text.push_str(&format!("Input: {}\n\n", result.input));
    text.push_str(&format!("  Changes:         {}\n", result.changes));
    text.push_str(&format!("  Indexed changes: {}\n\n", result.indexed_changes));
    text.push_str("Root DSE:\n");
    for (name, value) in &result.attributes {
        text.push_str(&format!("  {name}: {value}\n"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::tests::{dump_file, record};

    #[test]
    fn reports_change_number_range() {
        let file = dump_file(&[
            record("o=a", 1, 1, true),
            record("o=a", 2, 1, true),
            record("o=a", 3, 1, false),
        ]);

        let text = run(file.path(), &[], false).unwrap();

        assert!(text.contains("  Changes:         3\n"));
        assert!(text.contains("  Indexed changes: 2\n"));
        assert!(text.contains("  firstChangeNumber: 1\n"));
        assert!(text.contains("  lastChangeNumber: 2\n"));
    }

    #[test]
    fn json_output() {
        let file = dump_file(&[record("o=a", 1, 1, true)]);

        let text = run(file.path(), &[], true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["changes"], 1);
        assert_eq!(value["attributes"][0][0], "firstChangeNumber");
    }
}
