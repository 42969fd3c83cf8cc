//! Cookie command implementation.

use super::open_backend;
use std::path::Path;

/// Returns the newest cookie of the changelog in `input`.
pub fn run(input: &Path, exclude: &[String]) -> Result<String, Box<dyn std::error::Error>> {
    let backend = open_backend(input, exclude)?;
    Ok(backend.newest_cookie().to_string())
}
