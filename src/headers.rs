use reqwest::Method;

pub const APPLICATION_JSON: &str = "application/json";
pub const MULTIPART_MIXED: &str = "multipart/mixed";

const ATTACHMENTS: &str = "attachments";

/// Whether a resource path addresses the attachment resource.
#[must_use]
pub fn is_attachment_path(path: &str) -> bool {
    path.contains(ATTACHMENTS)
}

/// The content type to send for a request, or `None` when the body encoder must set it.
///
/// Attachments are downloaded as `multipart/mixed` and uploaded as `multipart/form-data`, where
/// the boundary is only known to the multipart encoder. Everything else is JSON.
#[must_use]
pub fn content_type_for(method: &Method, path: &str) -> Option<&'static str> {
    if !is_attachment_path(path) {
        return Some(APPLICATION_JSON);
    }

    match *method {
        Method::GET => Some(MULTIPART_MIXED),
        Method::POST => None,
        _ => Some(APPLICATION_JSON),
    }
}
