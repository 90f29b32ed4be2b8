use http::header::{self, HeaderMap, HeaderValue};

/// Adds `value` to the `Vary` header as a comma-separated list entry.
///
/// Existing `Vary` lines are joined into one value. Nothing changes when the
/// entry (case-insensitive) or `*` is already present.
pub(crate) fn add_vary_header(headers: &mut HeaderMap, value: &'static str) {
    let existing: Vec<&HeaderValue> = headers.get_all(header::VARY).iter().collect();
    if existing.is_empty() {
        headers.insert(header::VARY, HeaderValue::from_static(value));
        return;
    }

    let already_varies = existing
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case(value));
    if already_varies {
        return;
    }

    let mut joined = Vec::new();
    for vary in existing {
        let vary = vary.as_bytes().trim_ascii();
        if vary.is_empty() {
            continue;
        }
        joined.extend_from_slice(vary);
        joined.extend_from_slice(b", ");
    }
    joined.extend_from_slice(value.as_bytes());

    match HeaderValue::from_bytes(&joined) {
        Ok(joined) => {
            headers.insert(header::VARY, joined);
        }
        Err(_) => {
            headers.append(header::VARY, HeaderValue::from_static(value));
        }
    }
}

/// Returns the lowercased media type of `Content-Type`, without parameters.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type.split(';').next()?.trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}
