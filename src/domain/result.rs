//! Result type alias for EHRglot

use super::errors::EhrglotError;

/// Result type alias for EHRglot operations
///
/// # Examples
///
/// ```
/// use ehrglot::domain::result::Result;
/// use ehrglot::domain::errors::EhrglotError;
///
/// fn load() -> Result<String> {
///     Ok("patient".to_string())
/// }
///
/// fn reject() -> Result<()> {
///     Err(EhrglotError::Validation("missing resourceType".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, EhrglotError>;
