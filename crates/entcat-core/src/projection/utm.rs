//! UTM tagging and query-string merging.

use unicode_normalization::UnicodeNormalization;
use url::{form_urlencoded, Url};

/// UTM medium attached to every enterprise link.
pub const UTM_MEDIUM: &str = "enterprise";

/// Lowercase, hyphen-separated slug of a display name.
///
/// Letters are folded to ASCII through compatibility decomposition, so
/// accents are dropped rather than the whole letter. Other characters than
/// ASCII alphanumerics, `_`, `-` and whitespace are removed; runs of
/// whitespace and hyphens collapse to one hyphen, and leading or trailing
/// `-` and `_` are trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.nfkd().filter(char::is_ascii) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_whitespace() || ch == '-' {
            pending_separator = true;
        }
    }
    slug.trim_matches(|ch| ch == '-' || ch == '_').to_string()
}

/// UTM parameters identifying an enterprise as the traffic source.
pub fn enterprise_utm_context(enterprise_name: &str) -> Vec<(String, String)> {
    vec![
        ("utm_medium".to_string(), UTM_MEDIUM.to_string()),
        ("utm_source".to_string(), slugify(enterprise_name)),
    ]
}

/// Merge `params` into the query string of `url`.
///
/// Existing parameters not named in `params` are kept in order; `params` are
/// then appended, replacing any earlier value under the same name. Only the
/// query is rewritten: scheme, host, path and fragment are kept as written.
/// Text that does not parse as an absolute URL is returned unchanged.
pub fn update_query_parameters(url: &str, params: &[(String, String)]) -> String {
    if Url::parse(url).is_err() {
        return url.to_string();
    }

    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (base, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if !params.iter().any(|(name, _)| *name == key) {
            serializer.append_pair(&key, &value);
        }
    }
    for (key, value) in params {
        serializer.append_pair(key, value);
    }

    let mut updated = format!("{base}?{}", serializer.finish());
    if let Some(fragment) = fragment {
        updated.push('#');
        updated.push_str(fragment);
    }
    updated
}
