//! Validation Utilities

use validator::ValidationErrors;

use super::error::SyncError;

/// Flatten validator errors into a single `field: message` description.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect();
    fields.sort();

    fields
        .into_iter()
        .next()
        .unwrap_or_else(|| "Validation failed".into())
}

/// Convert validation errors to a submission rejection
pub fn validation_error(errors: ValidationErrors) -> SyncError {
    SyncError::Validation(describe(&errors))
}

/// Content must be non-blank and at most `max_chars` characters.
pub fn check_content(content: &str, max_chars: usize) -> Result<(), SyncError> {
    if content.trim().is_empty() {
        return Err(SyncError::Validation(
            "content: Message content must not be empty".into(),
        ));
    }

    let length = content.chars().count();
    if length > max_chars {
        return Err(SyncError::Validation(format!(
            "content: Message is {} characters, limit is {}",
            length, max_chars
        )));
    }

    Ok(())
}
