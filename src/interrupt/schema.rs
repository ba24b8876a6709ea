//! Known tool-call argument shapes

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::conversation::BOOK_TIME_ENTRY_TOOL;

/// Why proposed arguments did not match a schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed arguments: {0}")]
    Malformed(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Validated arguments of a recognized tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    BookTimeEntry(BookTimeEntry),
}

impl ToolArgs {
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolArgs::BookTimeEntry(_) => BOOK_TIME_ENTRY_TOOL,
        }
    }

    /// Full argument set in wire form
    pub fn to_value(&self) -> Value {
        match self {
            ToolArgs::BookTimeEntry(args) => args.to_value(),
        }
    }
}

/// A named argument shape the decoder can validate against.
///
/// Adding a tool means adding a `ToolArgs` variant and registering a schema
/// with `InterruptDecoder::with_schema`.
pub trait ToolSchema: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, args: &Value) -> Result<ToolArgs, SchemaError>;
}

/// `book_time_entry` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct BookTimeEntry {
    pub client_name: String,
    pub project_name: String,
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBookTimeEntry {
    client_name: String,
    project_name: String,
    project_id: String,
    date: String,
    hours: f64,
}

impl BookTimeEntry {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "clientName": self.client_name,
            "projectName": self.project_name,
            "projectId": self.project_id.to_string(),
            "date": self.date.format("%Y-%m-%d").to_string(),
            "hours": self.hours,
        })
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

pub struct BookTimeEntrySchema;

impl ToolSchema for BookTimeEntrySchema {
    fn name(&self) -> &'static str {
        BOOK_TIME_ENTRY_TOOL
    }

    fn parse(&self, args: &Value) -> Result<ToolArgs, SchemaError> {
        let raw: RawBookTimeEntry = serde_json::from_value(args.clone())
            .map_err(|e| SchemaError::Malformed(e.to_string()))?;

        let project_id = Uuid::parse_str(raw.project_id.trim()).map_err(|e| {
            SchemaError::InvalidField {
                field: "projectId",
                reason: e.to_string(),
            }
        })?;
        let date = parse_date(&raw.date).ok_or_else(|| SchemaError::InvalidField {
            field: "date",
            reason: format!("not a date: {}", raw.date),
        })?;
        if !raw.hours.is_finite() || raw.hours <= 0.0 {
            return Err(SchemaError::InvalidField {
                field: "hours",
                reason: format!("must be a positive number, got {}", raw.hours),
            });
        }

        Ok(ToolArgs::BookTimeEntry(BookTimeEntry {
            client_name: raw.client_name,
            project_name: raw.project_name,
            project_id,
            date,
            hours: raw.hours,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Value {
        json!({
            "clientName": "Intertech",
            "projectName": "Paid Time Off",
            "projectId": "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e",
            "date": "2025-04-16",
            "hours": 8
        })
    }

    #[test]
    fn test_parse_valid_args() {
        let ToolArgs::BookTimeEntry(entry) = BookTimeEntrySchema.parse(&args()).unwrap();
        assert_eq!(entry.client_name, "Intertech");
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 4, 16).unwrap());
        assert_eq!(entry.hours, 8.0);
    }

    #[test]
    fn test_date_coercion() {
        assert_eq!(
            parse_date("2025-04-16T00:00:00Z"),
            NaiveDate::from_ymd_opt(2025, 4, 16)
        );
        assert_eq!(
            parse_date("2025-04-16T09:30:00"),
            NaiveDate::from_ymd_opt(2025, 4, 16)
        );
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut bad_id = args();
        bad_id["projectId"] = json!("not-a-uuid");
        assert!(matches!(
            BookTimeEntrySchema.parse(&bad_id),
            Err(SchemaError::InvalidField { field: "projectId", .. })
        ));

        let mut zero_hours = args();
        zero_hours["hours"] = json!(0);
        assert!(matches!(
            BookTimeEntrySchema.parse(&zero_hours),
            Err(SchemaError::InvalidField { field: "hours", .. })
        ));

        let mut missing = args();
        missing.as_object_mut().unwrap().remove("clientName");
        assert!(matches!(
            BookTimeEntrySchema.parse(&missing),
            Err(SchemaError::Malformed(_))
        ));
    }

    #[test]
    fn test_wire_form_is_full_argument_set() {
        let ToolArgs::BookTimeEntry(entry) = BookTimeEntrySchema.parse(&args()).unwrap();
        let value = entry.to_value();
        assert_eq!(value["date"], "2025-04-16");
        assert_eq!(value["projectId"], "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e");
        assert_eq!(value["hours"].as_f64(), Some(8.0));
        assert_eq!(value.as_object().unwrap().len(), 5);
    }
}
