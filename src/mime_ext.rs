//! MIME type to file extension lookup.
//!
//! The first extension of every list is the canonical one, the one appended
//! to filenames that lack a matching extension. `mime_guess` only knows its
//! extensions in no particular order, so the common web types carry an
//! explicit preference here and everything else falls back to it.

use mime::Mime;

const PREFERRED: &[(&str, &[&str])] = &[
    ("text/html", &["html", "htm", "shtml"]),
    ("application/xhtml+xml", &["xhtml", "xht"]),
    ("text/css", &["css"]),
    ("text/javascript", &["js", "mjs"]),
    ("application/javascript", &["js", "mjs"]),
    ("application/x-javascript", &["js"]),
    ("application/json", &["json", "map"]),
    ("text/plain", &["txt", "text", "conf", "def", "list", "log", "in", "ini"]),
    ("text/xml", &["xml"]),
    ("application/xml", &["xml", "xsl", "xsd", "rng"]),
    ("application/rss+xml", &["rss"]),
    ("application/atom+xml", &["atom"]),
    ("application/pdf", &["pdf"]),
    ("application/zip", &["zip"]),
    ("application/wasm", &["wasm"]),
    (
        "application/octet-stream",
        &["bin", "dms", "lrf", "mar", "so", "dist", "distz", "pkg", "bpk", "dump", "elc", "deploy", "exe", "dll", "deb", "dmg", "iso", "img", "msi", "msp", "msm", "buffer"],
    ),
    ("image/png", &["png"]),
    ("image/jpeg", &["jpeg", "jpg", "jpe"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("image/svg+xml", &["svg", "svgz"]),
    ("image/x-icon", &["ico"]),
    ("image/vnd.microsoft.icon", &["ico"]),
    ("image/bmp", &["bmp"]),
    ("image/avif", &["avif"]),
    ("font/woff", &["woff"]),
    ("font/woff2", &["woff2"]),
    ("font/ttf", &["ttf"]),
    ("font/otf", &["otf"]),
    ("audio/mpeg", &["mpga", "mp2", "mp2a", "mp3", "m2a", "m3a"]),
    ("audio/ogg", &["oga", "ogg", "spx", "opus"]),
    ("video/mp4", &["mp4", "mp4v", "mpg4"]),
    ("video/webm", &["webm"]),
    ("video/x-flv", &["flv"]),
    ("video/x-matroska", &["mkv", "mk3d", "mks"]),
];

/// Candidate extensions for a raw `Content-Type` header value.
///
/// The header is split on `;` and the first part naming a known type wins,
/// so parameters such as `charset=utf-8` are ignored. Unknown or malformed
/// types yield an empty list.
pub fn extensions_for(content_type: &str) -> Vec<&'static str> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().parse::<Mime>().ok())
        .map(|mime| extensions_for_essence(&mime.essence_str().to_ascii_lowercase()))
        .find(|extensions| !extensions.is_empty())
        .unwrap_or_default()
}

fn extensions_for_essence(essence: &str) -> Vec<&'static str> {
    if let Some((_, extensions)) = PREFERRED.iter().find(|(mime, _)| *mime == essence) {
        return extensions.to_vec();
    }
    mime_guess::get_mime_extensions_str(essence)
        .map(|extensions| extensions.to_vec())
        .unwrap_or_default()
}

/// Whether any candidate extension belongs to the HTML family.
pub fn is_html_family(extensions: &[&str]) -> bool {
    extensions.iter().any(|extension| extension.contains("htm"))
}
