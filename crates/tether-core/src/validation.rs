// ── Item validation ──
//
// Pure rule set applied by the `items/add` and `items/change` commands.
// Every rule runs so a single pass reports all problems.

use crate::model::{DetailCode, ItemData, ValidationError, ValidationErrorDetails};

const NAME_REQUIRED: &str = "The name field is required.";
const URL_REQUIRED: &str = "The URL field is required.";
const URL_INVALID: &str = "The URL field is not a valid URL.";

/// Validate an item, returning every failed rule or `None` when clean.
///
/// Details keep discovery order (`name` before `url`); the top-level
/// message joins the detail messages with `", "`.
pub fn validate(item: &ItemData) -> Option<ValidationError> {
    let mut details = Vec::new();

    if item.name.is_empty() {
        details.push(detail(NAME_REQUIRED, DetailCode::Required, "name"));
    }

    if item.url.is_empty() {
        details.push(detail(URL_REQUIRED, DetailCode::Required, "url"));
    } else if !is_http_url(&item.url) {
        details.push(detail(URL_INVALID, DetailCode::Url, "url"));
    }

    if details.is_empty() {
        return None;
    }

    let message = details
        .iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Some(ValidationError { message, details })
}

/// `http:` or `https:` followed by at least one character on the same line.
fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"));
    match rest.and_then(|r| r.chars().next()) {
        Some(c) => !matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}'),
        None => false,
    }
}

fn detail(message: &str, code: DetailCode, field: &str) -> ValidationErrorDetails {
    ValidationErrorDetails {
        message: message.into(),
        code,
        field: field.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(name: &str, url: &str) -> ItemData {
        ItemData {
            name: name.into(),
            url: url.into(),
            description: String::new(),
        }
    }

    #[test]
    fn empty_item_reports_both_required_fields_in_order() {
        let err = validate(&item("", "")).unwrap();
        let fields: Vec<_> = err.details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, ["name", "url"]);
        assert!(err.details.iter().all(|d| d.code == DetailCode::Required));
        assert_eq!(
            err.message,
            "The name field is required., The URL field is required."
        );
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = validate(&item("a", "ftp://x")).unwrap();
        assert_eq!(err.details.len(), 1);
        assert_eq!(err.details[0].field, "url");
        assert_eq!(err.details[0].code, DetailCode::Url);
    }

    #[test]
    fn http_url_passes() {
        assert_eq!(validate(&item("a", "http://x")), None);
        assert_eq!(validate(&item("a", "https://example.com")), None);
    }

    #[test]
    fn scheme_without_remainder_is_rejected() {
        assert!(validate(&item("a", "http:")).is_some());
        assert!(validate(&item("a", "https:")).is_some());
        assert!(validate(&item("a", "http:\nx")).is_some());
    }

    #[test]
    fn missing_name_with_bad_url_collects_both() {
        let err = validate(&item("", "mailto:someone")).unwrap();
        let codes: Vec<_> = err.details.iter().map(|d| d.code).collect();
        assert_eq!(codes, [DetailCode::Required, DetailCode::Url]);
    }
}
