//! Content-type inference from location names.

/// Fallback for names without a known extension.
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const DICOM: &str = "application/dicom";

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("dcm", DICOM),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("zip", "application/zip"),
];

/// Infer a MIME type from the extension of the last path segment of `name`.
///
/// A dot-file such as `.dcm` counts as having the extension `dcm`.
pub fn infer_content_type(name: &str) -> &'static str {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return OCTET_STREAM;
    };

    EXTENSION_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(OCTET_STREAM)
}
