//! Batch identifier sources: a typed prompt line or a CSV column

use crate::error::{EntractlError, Result};
use std::io::Read;
use std::path::Path;

/// Split a prompt line into whitespace-separated identifiers
pub fn parse_prompt_line(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Read every non-empty trimmed cell of `column` from CSV data with a header row
pub fn read_csv_column<R: Read>(reader: R, column: &str) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let position = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            EntractlError::InvalidInput(format!(
                "CSV is missing required column '{}' (found: {})",
                column,
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })?;

    let mut identifiers = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(cell) = record.get(position).map(str::trim).filter(|c| !c.is_empty()) {
            identifiers.push(cell.to_string());
        }
    }

    Ok(identifiers)
}

/// Load identifiers from a CSV file
pub fn load_csv(path: &Path, column: &str) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    read_csv_column(file, column)
}

/// Reject batches with nothing to process
pub fn require_non_empty(identifiers: Vec<String>) -> Result<Vec<String>> {
    if identifiers.is_empty() {
        return Err(EntractlError::InvalidInput("No identifiers supplied".into()));
    }
    Ok(identifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_line() {
        assert_eq!(
            parse_prompt_line("  a@x.com\tb@x.com \n KIOSK-01 "),
            vec!["a@x.com", "b@x.com", "KIOSK-01"]
        );
        assert!(parse_prompt_line("   ").is_empty());
    }

    #[test]
    fn test_read_csv_column_trims_and_skips_blank_cells() {
        let data = "Name,EmailAddress\nAlice, alice@x.com \nBlank,\nBob,bob@x.com\n";
        let ids = read_csv_column(data.as_bytes(), "EmailAddress").unwrap();
        assert_eq!(ids, vec!["alice@x.com", "bob@x.com"]);
    }

    #[test]
    fn test_column_match_is_case_insensitive_and_ignores_bom() {
        let data = "\u{feff}devicename\nPC-1\nPC-2\n";
        let ids = read_csv_column(data.as_bytes(), "DeviceName").unwrap();
        assert_eq!(ids, vec!["PC-1", "PC-2"]);
    }

    #[test]
    fn test_missing_column_is_invalid_input() {
        let data = "Name,Mail\nAlice,alice@x.com\n";
        let err = read_csv_column(data.as_bytes(), "EmailAddress").unwrap_err();
        match err {
            EntractlError::InvalidInput(msg) => assert!(msg.contains("EmailAddress")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let data = "Name,EmailAddress\nAlice\nBob,bob@x.com\n";
        let ids = read_csv_column(data.as_bytes(), "EmailAddress").unwrap();
        assert_eq!(ids, vec!["bob@x.com"]);
    }

    #[test]
    fn test_load_csv_unreadable_path() {
        let err = load_csv(Path::new("/nonexistent/batch.csv"), "EmailAddress").unwrap_err();
        assert!(matches!(err, EntractlError::IoError(_)));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty(Vec::new()).is_err());
        assert_eq!(require_non_empty(vec!["a".into()]).unwrap(), vec!["a"]);
    }
}
