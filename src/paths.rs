//! Mapping of URLs to on-disk locations, and of pairs of locations to the
//! relative hyperlink between them.

use std::iter;

use crate::mime_ext;
use crate::urls;

/// Where a resource lives relative to the output root.
///
/// `directory` never ends with `/` and `filename` never contains one, so
/// `directory/filename` is always a valid relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalPath {
    pub directory: String,
    pub filename: String,
}

impl LocalPath {
    pub fn new(directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.directory.split('/')
    }
}

/// How filenames are spelled on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilenamePolicy {
    /// Keep every character the URL had.
    #[default]
    Preserve,
    /// Replace characters that restrictive filesystems (Windows) reject.
    Sanitize,
}

impl FilenamePolicy {
    /// The policy matching the platform this binary was built for.
    pub fn for_host() -> Self {
        if cfg!(windows) {
            FilenamePolicy::Sanitize
        } else {
            FilenamePolicy::Preserve
        }
    }

    fn apply(self, path: LocalPath) -> LocalPath {
        match self {
            FilenamePolicy::Preserve => path,
            FilenamePolicy::Sanitize => LocalPath {
                directory: path
                    .directory
                    .split('/')
                    .map(sanitize_segment)
                    .collect::<Vec<_>>()
                    .join("/"),
                filename: sanitize_segment(&path.filename),
            },
        }
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '_',
            c => c,
        })
        .collect()
}

/// Maps an absolute URL and its raw `Content-Type` header to a local path.
///
/// The scheme and fragment are dropped, a trailing `?query` is carried over
/// to the end of the filename (with `/` spelled `%2F`), and an extension implied by the content type
/// is appended unless the name already ends with one of the candidates.
pub fn get_paths(absolute_url: &str, content_type: &str, policy: FilenamePolicy) -> LocalPath {
    let extensions = mime_ext::extensions_for(content_type);
    let canonical = extensions.first().copied();
    let with_canonical = |stem: &str| match canonical {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem.to_string(),
    };

    if absolute_url.is_empty() {
        return policy.apply(LocalPath::new(".", with_canonical("index")));
    }

    let end = absolute_url.find('#').unwrap_or(absolute_url.len());
    let start = absolute_url[..end].find("://").map_or(0, |index| index + 3);
    let mut path = &absolute_url[start..end];

    let mut suffix = "";
    if let Some(index) = urls::params_start(path) {
        suffix = &path[index..];
        path = &path[..index];
    }

    let is_html = !extensions.is_empty()
        && (mime_ext::is_html_family(&extensions)
            || [".html", ".htm", ".xhtml"]
                .iter()
                .any(|extension| absolute_url.ends_with(extension)));

    let (directory, mut filename) = if path.ends_with('/') && is_html {
        (&path[..path.len() - 1], "index.html".to_string())
    } else if let Some((directory, name)) = path.rsplit_once('/') {
        let mut filename = if name.is_empty() {
            "index".to_string()
        } else {
            name.to_string()
        };
        let has_candidate = extensions
            .iter()
            .any(|extension| filename.ends_with(&format!(".{extension}")));
        if !has_candidate {
            if let Some(extension) = canonical {
                filename = format!("{filename}.{extension}");
            }
        }
        (directory, filename)
    } else {
        // No slash at all: the whole thing is a bare host.
        (path, with_canonical("index"))
    };
    // The query is part of the filename, so it must not introduce directories.
    filename.push_str(&suffix.replace('/', "%2F"));

    let directory = directory.trim_end_matches('/');
    let directory = if directory.is_empty() { "." } else { directory };

    policy.apply(LocalPath::new(directory, filename))
}

/// Relative link from the document stored for `from_url` to the resource
/// stored for `to_url`, both mapped without a content-type hint.
pub fn relative_link(from_url: &str, to_url: &str) -> String {
    relative_link_between(
        &get_paths(from_url, "", FilenamePolicy::default()),
        &get_paths(to_url, "", FilenamePolicy::default()),
    )
}

/// Relative link from a file stored at `from` to a file stored at `to`.
///
/// `.` for a self-reference; otherwise one `../` per directory of `from`
/// outside the common prefix, followed by the rest of `to`. Characters a
/// browser would read as URL syntax (`%`, `?`, `#`) are percent-encoded.
pub fn relative_link_between(from: &LocalPath, to: &LocalPath) -> String {
    if from == to {
        return ".".to_string();
    }

    let source: Vec<&str> = from.segments().collect();
    let target: Vec<&str> = to.segments().chain(iter::once(to.filename.as_str())).collect();

    let common = source
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut link = "../".repeat(source.len() - common);
    link.push_str(
        &target[common..]
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join("/"),
    );
    link
}

fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3F"),
            '#' => escaped.push_str("%23"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(url: &str, content_type: &str) -> LocalPath {
        get_paths(url, content_type, FilenamePolicy::Preserve)
    }

    #[test]
    fn test_regular_urls() {
        let cases = [
            ("https://www.example.com/resources/index.html", "text/html", "www.example.com/resources", "index.html"),
            ("http://google.com/pages/1/", "text/html", "google.com/pages/1", "index.html"),
            ("https://subdomain.domain.xyz/a-somewhat-long-name", "text/html", "subdomain.domain.xyz", "a-somewhat-long-name.html"),
            ("https://a.n.example.com/assets/images/example.png", "image/png", "a.n.example.com/assets/images", "example.png"),
            ("https://free-images-repo.site/cat", "image/png", "free-images-repo.site", "cat.png"),
            ("ftp://free-images-repo.site", "image/jpeg", "free-images-repo.site", "index.jpeg"),
            ("http://example.com/", "text/html; charset=utf-8", "example.com", "index.html"),
        ];

        for (url, content_type, directory, filename) in cases {
            assert_eq!(paths(url, content_type), LocalPath::new(directory, filename), "url {url}");
        }
    }

    #[test]
    fn test_weird_urls() {
        let cases = [
            ("ultimate-epic-games.net", "blaaarg", "ultimate-epic-games.net", "index"),
            ("pastebin.com/archive/pastes/2016/doc.txt", "invalid-mime-type", "pastebin.com/archive/pastes/2016", "doc.txt"),
            ("pastebin.com", "", "pastebin.com", "index"),
            ("", "video/x-matroska", ".", "index.mkv"),
            ("", "", ".", "index"),
            ("a.org/wrong-extension.png", "video/x-flv", "a.org", "wrong-extension.png.flv"),
            ("E/index.html", "video/x-flv", "E", "index.html.flv"),
            ("ssh://site.site/extension-without-dot-flv", "video/x-flv", "site.site", "extension-without-dot-flv.flv"),
        ];

        for (url, content_type, directory, filename) in cases {
            assert_eq!(paths(url, content_type), LocalPath::new(directory, filename), "url {url}");
        }
    }

    #[test]
    fn test_trailing_slash_without_content_type() {
        assert_eq!(paths("http://example.com/a/b/c/", ""), LocalPath::new("example.com/a/b/c", "index"));
    }

    #[test]
    fn test_existing_extension_is_not_doubled() {
        assert_eq!(paths("http://example.com/photo.jpg", "image/jpeg").filename, "photo.jpg");
        assert_eq!(paths("http://example.com/page.htm", "text/html").filename, "page.htm");
    }

    #[test]
    fn test_query_and_fragment() {
        assert_eq!(
            paths("http://example.com/search?q=rust#results", "text/html"),
            LocalPath::new("example.com", "search.html?q=rust")
        );
        assert_eq!(paths("http://example.com/about#team", ""), LocalPath::new("example.com", "about"));
    }

    #[test]
    fn test_query_with_slashes_stays_in_filename() {
        let location = paths("http://example.com/login?next=/home/", "text/html");
        assert_eq!(location, LocalPath::new("example.com", "login.html?next=%2Fhome%2F"));

        let sanitized = get_paths("http://example.com/login?next=/home", "text/html", FilenamePolicy::Sanitize);
        assert_eq!(sanitized, LocalPath::new("example.com", "login.html_next=_2Fhome"));

        let index = paths("http://example.com/", "text/html");
        assert_eq!(relative_link_between(&index, &location), "login.html%3Fnext=%252Fhome%252F");
    }

    #[test]
    fn test_sanitized_paths() {
        let sanitized = get_paths("http://example.com:8080/a|b/file?x=\"1\"", "", FilenamePolicy::Sanitize);
        assert_eq!(sanitized, LocalPath::new("example.com_8080/a_b", "file_x=_1_"));
    }

    #[test]
    fn test_relative_links() {
        let cases = [
            ("http://example.com/a/page.html", "http://example.com/a/other.html", "other.html"),
            ("http://example.com/a/b/page.html", "http://example.com/a/c/img.png", "../c/img.png"),
            ("http://example.com/index.html", "http://example.com/docs/guide.html", "docs/guide.html"),
            ("http://example.com/docs/guide/intro.html", "http://example.com/about.html", "../../about.html"),
            ("http://example.com/index.html", "http://cdn.example.net/lib/x.js", "../cdn.example.net/lib/x.js"),
            ("http://example.com/list.html", "http://example.com/list.html?page=2", "list.html%3Fpage=2"),
        ];

        for (from, to, expected) in cases {
            assert_eq!(relative_link(from, to), expected, "{from} -> {to}");
        }
    }

    #[test]
    fn test_self_reference() {
        assert_eq!(relative_link("http://example.com/a.html", "http://example.com/a.html"), ".");
        assert_eq!(relative_link("http://example.com/a.html", "https://example.com/a.html#top"), ".");
    }

    #[test]
    fn test_typed_relative_link() {
        let from = get_paths("http://example.com/", "text/html", FilenamePolicy::Preserve);
        let to = get_paths("http://example.com/about", "text/html", FilenamePolicy::Preserve);
        assert_eq!(relative_link_between(&from, &to), "about.html");
        assert_eq!(relative_link_between(&to, &from), "index.html");
    }
}
