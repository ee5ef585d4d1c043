//! Bundle partitioning

use crate::domain::{Bundle, PipelineError, Result};

/// Splits a bundle into consecutive chunks of at most `max_size` entries
///
/// Every chunk is a new bundle of the original type. Concatenating the chunks
/// reproduces the original entry sequence. An empty bundle yields no chunks.
///
/// # Errors
///
/// Returns `PipelineError::InvalidArgument` if `max_size` is zero.
pub fn partition(bundle: &Bundle, max_size: usize) -> Result<Vec<Bundle>> {
    if max_size == 0 {
        return Err(PipelineError::InvalidArgument(
            "bundle max size must be greater than zero".to_string(),
        ));
    }

    Ok(bundle
        .entries()
        .chunks(max_size)
        .map(|chunk| Bundle::from_parts(bundle.bundle_type(), chunk.to_vec()))
        .collect())
}
