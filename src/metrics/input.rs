//! Decoding of caller-supplied JSON batches.
//!
//! The engine accepts a JSON array of records. Anything else is rejected up
//! front rather than treated as an empty batch.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::enrich::{ActorRosterEntry, Roster};
use super::types::{DeliveryRecord, RequestRecord};

#[derive(Debug, Error)]
pub enum InputShapeError {
    #[error("Expected a JSON array of records, found {found}")]
    NotAnArray { found: &'static str },
    #[error("Record {index} does not have the expected shape: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path} as JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_array<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, InputShapeError> {
    let Value::Array(items) = value else {
        return Err(InputShapeError::NotAnArray {
            found: json_type_name(&value),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|source| InputShapeError::InvalidRecord { index, source })
        })
        .collect()
}

pub fn parse_request_records(value: Value) -> Result<Vec<RequestRecord>, InputShapeError> {
    parse_array(value)
}

pub fn parse_delivery_records(value: Value) -> Result<Vec<DeliveryRecord>, InputShapeError> {
    parse_array(value)
}

pub fn parse_roster(value: Value) -> Result<Roster, InputShapeError> {
    let entries: Vec<ActorRosterEntry> = parse_array(value)?;
    Ok(Roster::new(entries))
}

/// Read a whole JSON document from disk.
pub fn read_json_file(path: &Path) -> Result<Value, InputShapeError> {
    let file = File::open(path).map_err(|source| InputShapeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| InputShapeError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_rejects_non_array() {
        let err = parse_request_records(json!({"ts": "2024-05-01T10:00:00Z"})).unwrap_err();
        assert!(matches!(err, InputShapeError::NotAnArray { found: "an object" }));

        let err = parse_delivery_records(Value::Null).unwrap_err();
        assert!(matches!(err, InputShapeError::NotAnArray { found: "null" }));
    }

    #[test]
    fn test_reports_bad_record_index() {
        let value = json!([
            {"operationId": "getX", "responseCode": 200},
            {"operationId": "getY", "responseCode": "two hundred"}
        ]);
        match parse_request_records(value) {
            Err(InputShapeError::InvalidRecord { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_parses_sparse_records() {
        let records = parse_request_records(json!([{}, {"userAgent": "curl/8.0"}])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], RequestRecord::default());
        assert_eq!(records[1].user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_parse_roster() {
        let roster = parse_roster(json!([
            {"id": "a1", "name": "Ada", "email": "ada@example.com"},
            {"id": "a2"}
        ]))
        .unwrap();
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_read_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"sentAt": "2024-05-01T10:00:00Z", "responseCode": 200}}]"#).unwrap();
        let value = read_json_file(file.path()).unwrap();
        let records = parse_delivery_records(value).unwrap();
        assert_eq!(records[0].response_code, 200);

        let err = read_json_file(Path::new("/nonexistent/requests.json")).unwrap_err();
        assert!(matches!(err, InputShapeError::Io { .. }));
    }
}
