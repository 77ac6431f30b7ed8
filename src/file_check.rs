//! Client-side file metadata checks that run before any parsing or upload.

use thiserror::Error;

/// Upload size cap: 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Longest accepted filename.
pub const MAX_FILENAME_LEN: usize = 255;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

/// MIME types that identify an accepted format on their own.
const ACCEPTED_MIME_TYPES: [&str; 4] = [
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/csv",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileCheckError {
    #[error("unsupported file type '{0}': accepted formats are .xlsx, .xls, .csv")]
    UnsupportedType(String),
    #[error("file is {size} bytes, above the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("filename is {0} characters long, above the {1} character limit")]
    NameTooLong(usize, usize),
}

/// Metadata of an upload, known before reading any content.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub filename: String,
    pub mime: Option<String>,
    pub size: u64,
}

/// Validate upload metadata. Rules run in order, first failure wins:
/// type, then size, then filename length. Pure, no I/O.
pub fn check_file(meta: &FileMeta) -> Result<(), FileCheckError> {
    if !type_accepted(meta) {
        return Err(FileCheckError::UnsupportedType(describe_type(meta)));
    }
    if meta.size > MAX_FILE_SIZE {
        return Err(FileCheckError::TooLarge {
            size: meta.size,
            max: MAX_FILE_SIZE,
        });
    }
    if meta.filename.chars().count() > MAX_FILENAME_LEN {
        return Err(FileCheckError::NameTooLong(
            meta.filename.chars().count(),
            MAX_FILENAME_LEN,
        ));
    }
    Ok(())
}

pub fn extension_of(filename: &str) -> String {
    filename.rsplit('.').next().unwrap_or("").to_lowercase()
}

/// The declared MIME decides when it is specific: a recognized spreadsheet
/// MIME accepts, any other specific MIME rejects regardless of extension.
/// Browsers often send `application/octet-stream` for spreadsheets, so
/// only a generic or absent MIME falls back to the extension.
fn type_accepted(meta: &FileMeta) -> bool {
    match meta.mime.as_deref() {
        Some(mime) if ACCEPTED_MIME_TYPES.contains(&mime) => true,
        Some(mime) if is_specific_mime(mime) => false,
        _ => ACCEPTED_EXTENSIONS.contains(&extension_of(&meta.filename).as_str()),
    }
}

fn is_specific_mime(mime: &str) -> bool {
    !mime.is_empty() && mime != "application/octet-stream"
}

fn describe_type(meta: &FileMeta) -> String {
    match meta.mime.as_deref() {
        Some(mime) if is_specific_mime(mime) => mime.to_string(),
        _ => format!(".{}", extension_of(&meta.filename)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str, mime: Option<&str>, size: u64) -> FileMeta {
        FileMeta {
            filename: filename.to_string(),
            mime: mime.map(|m| m.to_string()),
            size,
        }
    }

    #[test]
    fn test_accepts_csv_by_extension() {
        assert!(check_file(&meta("list.csv", None, 1024)).is_ok());
    }

    #[test]
    fn test_accepts_xlsx_with_generic_mime() {
        let m = meta("list.xlsx", Some("application/octet-stream"), 1024);
        assert!(check_file(&m).is_ok());
    }

    #[test]
    fn test_rejects_mime_contradicting_the_extension() {
        // A specific non-spreadsheet MIME wins over an accepted extension.
        let err = check_file(&meta("liste.csv", Some("application/pdf"), 1024)).unwrap_err();
        assert_eq!(err, FileCheckError::UnsupportedType("application/pdf".into()));
    }

    #[test]
    fn test_accepts_recognized_mime_over_extension() {
        let m = meta("export.tmp", Some("text/csv"), 1024);
        assert!(check_file(&m).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let err = check_file(&meta("list.pdf", None, 1024)).unwrap_err();
        assert!(matches!(err, FileCheckError::UnsupportedType(_)));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let err = check_file(&meta("list.csv", None, 11 * 1024 * 1024)).unwrap_err();
        assert!(matches!(err, FileCheckError::TooLarge { .. }));
    }

    #[test]
    fn test_size_exactly_at_limit_accepted() {
        assert!(check_file(&meta("list.csv", None, MAX_FILE_SIZE)).is_ok());
    }

    #[test]
    fn test_rejects_overlong_filename() {
        let name = format!("{}.csv", "a".repeat(300));
        let err = check_file(&meta(&name, None, 1024)).unwrap_err();
        assert!(matches!(err, FileCheckError::NameTooLong(..)));
    }

    #[test]
    fn test_type_checked_before_size() {
        // An oversized pdf fails on type, not size.
        let err = check_file(&meta("list.pdf", None, 20 * 1024 * 1024)).unwrap_err();
        assert!(matches!(err, FileCheckError::UnsupportedType(_)));
    }
}
