// ── Serializable error objects ──
//
// These are values, not `std::error::Error`s: validation failures are
// stored in state and every remote failure crosses the channel in this
// shape, discriminated by the `code` field.

use serde::{Deserialize, Serialize};

/// Error shape shared by state (`items.error`) and command replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ErrorObject {
    #[serde(rename = "error/unknown")]
    Unknown { message: String },

    #[serde(rename = "error/validation")]
    Validation(ValidationError),
}

impl ErrorObject {
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unknown { message } => message,
            Self::Validation(err) => &err.message,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "error/unknown",
            Self::Validation(_) => "error/validation",
        }
    }

    /// Validation details, empty for non-validation errors.
    pub fn details(&self) -> &[ValidationErrorDetails] {
        match self {
            Self::Unknown { .. } => &[],
            Self::Validation(err) => &err.details,
        }
    }
}

impl From<ValidationError> for ErrorObject {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// One or more field-level problems found in a single validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub details: Vec<ValidationErrorDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetails {
    pub message: String,
    pub code: DetailCode,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
pub enum DetailCode {
    #[serde(rename = "error/validation-required")]
    #[strum(serialize = "error/validation-required")]
    Required,

    #[serde(rename = "error/validation-url")]
    #[strum(serialize = "error/validation-url")]
    Url,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unknown_serializes_with_code_tag() {
        let value = serde_json::to_value(ErrorObject::unknown("boom")).unwrap();
        assert_eq!(value, json!({ "code": "error/unknown", "message": "boom" }));
    }

    #[test]
    fn validation_parses_from_wire_shape() {
        let wire = json!({
            "code": "error/validation",
            "message": "The name field is required.",
            "details": [{
                "message": "The name field is required.",
                "code": "error/validation-required",
                "field": "name",
            }],
        });
        let obj: ErrorObject = serde_json::from_value(wire).unwrap();
        assert_eq!(obj.code(), "error/validation");
        assert_eq!(obj.details().len(), 1);
        assert_eq!(obj.details()[0].code, DetailCode::Required);
        assert_eq!(obj.details()[0].code.as_ref(), "error/validation-required");
    }
}
