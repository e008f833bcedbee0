use crate::TransferError;

/// Validates the file name announced to the backend.
///
/// Rejects:
/// - Empty or whitespace-only names
/// - Names containing `/` or `\`
/// - `.` and `..`
/// - Control characters
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidInput("empty file name".into()));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidInput(format!(
            "file name must not contain path separators: {name}"
        )));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidInput(format!(
            "file name not allowed: {name}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidInput(format!(
            "file name contains control characters: {name:?}"
        )));
    }

    Ok(())
}
