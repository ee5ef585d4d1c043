//! Result type alias for the pipeline
//!
//! This module provides a convenient Result type alias that uses
//! [`PipelineError`] as the error type.

use super::errors::PipelineError;

/// Result type alias for pipeline operations
///
/// # Examples
///
/// ```
/// use fhir_to_server::domain::result::Result;
/// use fhir_to_server::domain::errors::PipelineError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(PipelineError::InvalidArgument("bundles cannot be empty".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(PipelineError::Other("test error".to_string()));
        assert!(result.is_err());
    }
}
