//! Result type alias for the publisher
//!
//! This module provides a convenient Result type alias that uses DwcaError
//! as the error type.

use super::errors::DwcaError;

/// Result type alias for publisher operations
///
/// # Examples
///
/// ```
/// use dwca_publisher::domain::result::Result;
/// use dwca_publisher::domain::errors::DwcaError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(DwcaError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, DwcaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DwcaError;

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(DwcaError::Validation("test error".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
