//! URL algebra: reference resolution, slash-run normalization, host extraction.

use url::Url;

use crate::error::{MirrorError, Result};

/// Schemes a reference may carry and still be treated as already absolute.
const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Resolves `reference` against `base` into an absolute URL string.
///
/// References that already carry a supported scheme are taken as they are;
/// everything else (`./x`, `../x`, `/x`, `//host/x`, `?q`, `#f`, bare paths)
/// is resolved against `base` with the usual reference-resolution rules. The
/// result always goes through [`collapse_slashes`].
pub fn resolve(reference: &str, base: &str) -> Result<String> {
    let reference = reference.trim();

    let absolute = if is_absolute_reference(reference) {
        Url::parse(reference).map_err(|source| MirrorError::Url {
            url: reference.to_string(),
            source,
        })?
    } else {
        let base = Url::parse(base).map_err(|source| MirrorError::Url {
            url: base.to_string(),
            source,
        })?;
        base.join(reference).map_err(|source| MirrorError::Url {
            url: reference.to_string(),
            source,
        })?
    };

    Ok(collapse_slashes(absolute.as_str()))
}

fn is_absolute_reference(reference: &str) -> bool {
    if reference.starts_with("./") || reference.starts_with("../") || reference.starts_with('/') {
        return false;
    }
    scheme_of(reference).is_some_and(is_supported_scheme)
}

/// The `scheme` in `scheme:rest`, if the text before the first colon is a
/// syntactically valid scheme.
pub fn scheme_of(reference: &str) -> Option<&str> {
    let (scheme, _) = reference.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

pub fn is_supported_scheme(scheme: &str) -> bool {
    SUPPORTED_SCHEMES
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(scheme))
}

/// Replaces every run of two or more `/` in the path with a single one.
///
/// The `//` after the scheme survives, and so does anything from the first
/// `?` or `#` onwards.
pub fn collapse_slashes(url: &str) -> String {
    let end = params_start(url).unwrap_or(url.len());
    // Characters at or before `floor` are never touched.
    let floor = url[..end].find("://").map_or(1, |index| index + 4);
    let bytes = url.as_bytes();

    let mut collapsed = String::with_capacity(url.len());
    for (index, ch) in url.char_indices() {
        let redundant = ch == '/' && index > floor && index < end && bytes[index - 1] == b'/';
        if !redundant {
            collapsed.push(ch);
        }
    }
    collapsed
}

/// Byte offset of the first `?` or `#`, whichever comes first.
pub(crate) fn params_start(url: &str) -> Option<usize> {
    url.find(|c| c == '?' || c == '#')
}

/// Host of `url`, with the port appended when one is spelled out.
pub fn host_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|source| MirrorError::Url {
        url: url.to_string(),
        source,
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| MirrorError::MissingHost(url.to_string()))?;

    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(before, _)| before)
}

pub fn fragment_of(url: &str) -> Option<&str> {
    url.split_once('#').map(|(_, fragment)| fragment)
}
