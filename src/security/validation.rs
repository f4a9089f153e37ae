use crate::db::schema::ColumnIdentity;
use std::fmt;

/// Maximum length of a warehouse identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Errors that can occur during identifier validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyInput,
    TooLong { max: usize, actual: usize },
    NullBytes,
    InvalidIdentifier(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyInput => write!(f, "Identifier must not be empty"),
            ValidationError::TooLong { max, actual } => {
                write!(f, "Identifier length {} exceeds maximum of {}", actual, max)
            }
            ValidationError::NullBytes => write!(f, "Identifier contains null bytes"),
            ValidationError::InvalidIdentifier(name) => write!(
                f,
                "Invalid identifier '{}': only letters, digits, '_' and '$' are allowed",
                sanitize_for_display(name)
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a single database, schema, table or column name before it is
/// placed into a generated statement.
///
/// Valid identifiers:
/// - Are between 1 and 255 characters
/// - Contain only ASCII letters, digits, `_` and `$`
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let length = name.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_IDENTIFIER_LENGTH,
            actual: length,
        });
    }

    if name.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(ValidationError::InvalidIdentifier(name.to_string()));
    }

    Ok(())
}

/// Validate every part of a column or table identity.
pub fn validate_identity(identity: &ColumnIdentity) -> Result<(), ValidationError> {
    validate_identifier(&identity.database)?;
    validate_identifier(&identity.schema)?;
    validate_identifier(&identity.table)?;
    if let Some(column) = &identity.column {
        validate_identifier(column)?;
    }
    Ok(())
}

/// Strip control characters from a string for safe display.
/// Preserves newlines, carriage returns, and tabs.
pub fn sanitize_for_display(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\r' || *c == '\t')
        .collect()
}

/// Sanitize and cut to at most `max_chars` characters.
pub fn truncate_for_display(input: &str, max_chars: usize) -> String {
    sanitize_for_display(input).chars().take(max_chars).collect()
}
