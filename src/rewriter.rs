//! Per-document link rewriting.
//!
//! A document is parsed once to plan the work: every element contributes
//! [`LinkAttribute::COUNT`] pending units to a [`CountdownLatch`]. Units that
//! need nothing (absent attribute, `<base>`, self link, out of scope) settle
//! immediately; the others settle when the orchestrator reports where their
//! target ended up. Whoever settles the last unit serializes the document
//! with all recorded rewrites and hands it back for storage.
//!
//! The parsed tree is not `Send`, so it is not kept around between the two
//! steps: the source bytes are re-parsed at the end, which yields the same
//! element order.

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::downloader::{CrawlTarget, Resolution};
use crate::error::{MirrorError, Result};
use crate::html_parser::{ElementKind, HtmlDocument, LinkAttribute, RefreshTarget};
use crate::paths::{get_paths, relative_link_between, FilenamePolicy, LocalPath};
use crate::scope::DomainScope;
use crate::urls;

/// Called once with the final URL of a requested resource.
pub type OnResolved = Box<dyn FnOnce(Resolution) + Send + 'static>;

/// What a document needs from the crawl it belongs to.
pub trait CrawlContext: Send + Sync + 'static {
    fn scope(&self) -> &Arc<DomainScope>;

    fn filename_policy(&self) -> FilenamePolicy;

    /// Requests `target`; `on_resolved` must eventually be called exactly once.
    fn fetch(&self, target: CrawlTarget, on_resolved: OnResolved);

    fn store(&self, url: &str, content_type: &str, body: &[u8]) -> Result<()>;

    /// Ends the whole crawl with `error`.
    fn abort(&self, error: MirrorError);

    /// Records a logic error without disturbing other documents.
    fn report_defect(&self, error: MirrorError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Underflow {
    pub remaining: usize,
    pub requested: usize,
}

/// A countdown that reports reaching zero to exactly one caller.
#[derive(Debug)]
pub struct CountdownLatch {
    remaining: AtomicUsize,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Subtracts `units`. Returns `Ok(true)` for the one call that brings the
    /// count to zero, and refuses to go below zero.
    pub fn count_down(&self, units: usize) -> std::result::Result<bool, Underflow> {
        if units == 0 {
            return Ok(false);
        }
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(units)
            })
            .map(|previous| previous == units)
            .map_err(|remaining| Underflow {
                remaining,
                requested: units,
            })
    }
}

/// Where a resolved link is written back.
#[derive(Debug, Clone)]
enum Slot {
    Attribute(LinkAttribute),
    Refresh(RefreshTarget),
}

#[derive(Debug)]
struct Rewrite {
    element: usize,
    attribute: &'static str,
    value: String,
}

/// An HTML document waiting for its links to resolve.
pub struct PendingDocument {
    url: String,
    content_type: String,
    source: Vec<u8>,
    location: LocalPath,
    latch: CountdownLatch,
    rewrites: Mutex<Vec<Rewrite>>,
    context: Arc<dyn CrawlContext>,
}

impl PendingDocument {
    pub fn remaining(&self) -> usize {
        self.latch.remaining()
    }

    fn settle(&self, units: usize) {
        match self.latch.count_down(units) {
            Ok(true) => self.finish(),
            Ok(false) => {}
            Err(Underflow {
                remaining,
                requested,
            }) => self.context.report_defect(MirrorError::CounterUnderflow {
                url: self.url.clone(),
                remaining,
                requested,
            }),
        }
    }

    fn finish(&self) {
        let body = match self.render() {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %self.url, error = &err as &dyn Error, "storing document without rewritten links");
                self.source.clone()
            }
        };
        if let Err(err) = self.context.store(&self.url, &self.content_type, &body) {
            self.context.abort(err);
        }
    }

    fn render(&self) -> Result<Vec<u8>> {
        let html_error = |source| MirrorError::Html {
            url: self.url.clone(),
            source,
        };
        let document = HtmlDocument::parse(&self.source).map_err(html_error)?;
        let elements = document.elements();

        let rewrites = self.rewrites.lock().unwrap_or_else(PoisonError::into_inner);
        for rewrite in rewrites.iter() {
            if let Some(element) = elements.get(rewrite.element) {
                element.set_attribute(rewrite.attribute, &rewrite.value);
            }
        }
        drop(rewrites);

        document.serialize().map_err(html_error)
    }

    /// Resolves `reference` and either settles its units right away or asks
    /// the crawl for the target.
    fn follow(self: &Arc<Self>, base: &str, element: usize, reference: &str, units: usize, slot: Slot) {
        let absolute = match urls::resolve(reference, base) {
            Ok(absolute) => absolute,
            Err(err) => {
                warn!(document = %self.url, error = &err as &dyn Error, "leaving link as is");
                return self.settle(units);
            }
        };

        if !urls::scheme_of(&absolute).is_some_and(urls::is_supported_scheme) {
            debug!(document = %self.url, link = %absolute, "unsupported scheme");
            return self.settle(units);
        }

        let target = urls::strip_fragment(&absolute);
        if target == urls::strip_fragment(&self.url) {
            // Anchor within this document.
            if let Some(fragment) = urls::fragment_of(&absolute) {
                self.record(element, slot, format!("#{fragment}"));
            }
            return self.settle(units);
        }

        let host = match urls::host_of(target) {
            Ok(host) => host,
            Err(err) => {
                warn!(document = %self.url, error = &err as &dyn Error, "leaving link as is");
                return self.settle(units);
            }
        };
        let scope = self.context.scope();
        if !scope.contains(&host) {
            debug!(document = %self.url, link = %target, "out of scope");
            return self.settle(units);
        }

        let fragment = urls::fragment_of(&absolute).map(str::to_string);
        let pending = Arc::clone(self);
        self.context.fetch(
            CrawlTarget::new(target, Arc::clone(scope)),
            Box::new(move |resolution: Resolution| pending.resolved(element, slot, fragment, resolution, units)),
        );
    }

    fn resolved(&self, element: usize, slot: Slot, fragment: Option<String>, resolution: Resolution, units: usize) {
        let target = get_paths(
            &resolution.url,
            resolution.content_type.as_deref().unwrap_or_default(),
            self.context.filename_policy(),
        );
        let mut link = relative_link_between(&self.location, &target);
        if let Some(fragment) = fragment {
            link.push('#');
            link.push_str(&fragment);
        }

        self.record(element, slot, link);
        self.settle(units);
    }

    fn record(&self, element: usize, slot: Slot, link: String) {
        let (attribute, value) = match slot {
            Slot::Attribute(attribute) => (attribute.as_str(), link),
            Slot::Refresh(target) => ("content", target.with_url(&link)),
        };
        self.rewrites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rewrite {
                element,
                attribute,
                value,
            });
    }
}

/// Rewrites the links of the HTML document fetched from `url` (its final
/// URL) and stores it once every link has been dealt with.
///
/// Returns the pending document; it is already stored if nothing needed
/// fetching. Errors only when the body cannot be read as HTML at all.
pub fn rewrite_document(
    context: Arc<dyn CrawlContext>,
    url: String,
    content_type: String,
    body: Vec<u8>,
) -> Result<Arc<PendingDocument>> {
    let document = HtmlDocument::parse(&body).map_err(|source| MirrorError::Html {
        url: url.clone(),
        source,
    })?;

    let base = match document.base_href() {
        Some(href) => urls::resolve(&href, &url).unwrap_or_else(|err| {
            warn!(document = %url, error = &err as &dyn Error, "ignoring unparseable <base>");
            url.clone()
        }),
        None => url.clone(),
    };

    let plan: Vec<(ElementKind, Vec<(LinkAttribute, String)>)> = document
        .elements()
        .iter()
        .map(|element| (element.kind(), element.links()))
        .collect();
    drop(document);

    let location = get_paths(&url, &content_type, context.filename_policy());
    let pending = Arc::new(PendingDocument {
        latch: CountdownLatch::new(plan.len() * LinkAttribute::COUNT),
        url,
        content_type,
        source: body,
        location,
        rewrites: Mutex::new(Vec::new()),
        context,
    });

    if plan.is_empty() {
        pending.finish();
        return Ok(pending);
    }

    for (element, (kind, links)) in plan.into_iter().enumerate() {
        match kind {
            ElementKind::Base | ElementKind::MetaRefresh(None) => {
                pending.settle(LinkAttribute::COUNT);
            }
            ElementKind::MetaRefresh(Some(target)) => {
                let reference = target.url().to_string();
                pending.follow(&base, element, &reference, LinkAttribute::COUNT, Slot::Refresh(target));
            }
            ElementKind::Linking => {
                pending.settle(LinkAttribute::COUNT - links.len());
                for (attribute, reference) in links {
                    pending.follow(&base, element, &reference, 1, Slot::Attribute(attribute));
                }
            }
        }
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Default)]
    struct RecordingContext {
        scope: Arc<DomainScope>,
        requests: Mutex<Vec<(String, OnResolved)>>,
        stored: Mutex<Vec<(String, String)>>,
        defects: AtomicUsize,
    }

    impl RecordingContext {
        fn scoped(domains: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                scope: Arc::new(DomainScope::new(domains)),
                ..Default::default()
            })
        }

        fn take_requests(&self) -> Vec<(String, OnResolved)> {
            std::mem::take(&mut *self.requests.lock().unwrap())
        }

        fn requested_urls(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
        }

        fn stored(&self) -> Vec<(String, String)> {
            self.stored.lock().unwrap().clone()
        }
    }

    impl CrawlContext for RecordingContext {
        fn scope(&self) -> &Arc<DomainScope> {
            &self.scope
        }

        fn filename_policy(&self) -> FilenamePolicy {
            FilenamePolicy::Preserve
        }

        fn fetch(&self, target: CrawlTarget, on_resolved: OnResolved) {
            self.requests.lock().unwrap().push((target.url, on_resolved));
        }

        fn store(&self, url: &str, _content_type: &str, body: &[u8]) -> Result<()> {
            let html = String::from_utf8_lossy(body).into_owned();
            self.stored.lock().unwrap().push((url.to_string(), html));
            Ok(())
        }

        fn abort(&self, error: MirrorError) {
            panic!("unexpected abort: {error}");
        }

        fn report_defect(&self, _error: MirrorError) {
            self.defects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn open(context: &Arc<RecordingContext>, url: &str, html: &str) -> Arc<PendingDocument> {
        let context: Arc<dyn CrawlContext> = context.clone();
        rewrite_document(context, url.to_string(), "text/html".to_string(), html.as_bytes().to_vec()).unwrap()
    }

    fn fetched(url: &str, content_type: &str) -> Resolution {
        Resolution::fetched(url, content_type)
    }

    #[test]
    fn test_latch_reaches_zero_once() {
        let latch = CountdownLatch::new(3);
        assert_eq!(latch.count_down(1), Ok(false));
        assert_eq!(latch.count_down(0), Ok(false));
        assert_eq!(latch.count_down(2), Ok(true));
        assert_eq!(
            latch.count_down(1),
            Err(Underflow {
                remaining: 0,
                requested: 1
            })
        );
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_latch_under_contention() {
        let latch = CountdownLatch::new(8 * 1000);
        let zero_crossings = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        if latch.count_down(1).unwrap() {
                            zero_crossings.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(zero_crossings.load(Ordering::SeqCst), 1);
        assert!(latch.count_down(1).is_err());
    }

    #[test]
    fn test_document_waits_for_every_link() {
        let context = RecordingContext::scoped(&["example.com"]);
        let pending = open(
            &context,
            "http://example.com/",
            r##"<html><head><link rel="stylesheet" href="/style.css"></head><body>
                <a href="/about">About</a>
                <img src="img/logo.png">
                <a href="#top">Top</a>
                <a href="http://other.org/x">Elsewhere</a>
                <a href="mailto:someone@example.com">Mail</a>
                <a href="">Empty</a>
            </body></html>"##,
        );

        assert_eq!(
            context.requested_urls(),
            [
                "http://example.com/style.css",
                "http://example.com/about",
                "http://example.com/img/logo.png"
            ]
        );
        assert_eq!(pending.remaining(), 3);

        let mut requests = context.take_requests();
        let (_, logo) = requests.pop().unwrap();
        logo(fetched("http://example.com/img/logo.png", "image/png"));
        let (_, about) = requests.pop().unwrap();
        about(fetched("http://example.com/about", "text/html; charset=utf-8"));
        assert!(context.stored().is_empty());

        let (_, style) = requests.pop().unwrap();
        style(fetched("http://example.com/style.css", "text/css"));

        let stored = context.stored();
        assert_eq!(stored.len(), 1);
        let (url, html) = &stored[0];
        assert_eq!(url, "http://example.com/");
        assert!(html.contains(r#"href="style.css""#));
        assert!(html.contains(r#"href="about.html""#));
        assert!(html.contains(r#"src="img/logo.png""#));
        assert!(html.contains(r##"href="#top""##));
        assert!(html.contains(r#"href="http://other.org/x""#));
        assert!(html.contains(r#"href="mailto:someone@example.com""#));
        assert_eq!(context.defects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_out_of_order_completion_across_threads() {
        let context = RecordingContext::scoped(&[]);
        let anchors: String = (0..200).map(|i| format!(r#"<a href="/p/{i}">{i}</a>"#)).collect();
        let pending = open(&context, "http://example.com/p/index.html", &format!("<body>{anchors}</body>"));

        let mut requests = context.take_requests();
        assert_eq!(requests.len(), 200);
        requests.reverse();

        let mut batches: Vec<Vec<(String, OnResolved)>> = (0..8).map(|_| Vec::new()).collect();
        for (i, request) in requests.into_iter().enumerate() {
            batches[i % 8].push(request);
        }

        thread::scope(|s| {
            for batch in batches {
                s.spawn(move || {
                    for (url, on_resolved) in batch {
                        on_resolved(Resolution::fetched(&url, "text/html"));
                    }
                });
            }
        });

        let stored = context.stored();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].1.contains(r#"href="0.html""#));
        assert!(stored[0].1.contains(r#"href="199.html""#));
        assert_eq!(pending.remaining(), 0);
        assert_eq!(context.defects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_document_without_links_is_stored_immediately() {
        let context = RecordingContext::scoped(&[]);
        open(&context, "http://example.com/plain", "<p>nothing to see</p>");
        assert!(context.requested_urls().is_empty());
        assert_eq!(context.stored().len(), 1);
    }

    #[test]
    fn test_base_element_sets_resolution_base() {
        let context = RecordingContext::scoped(&[]);
        open(
            &context,
            "http://example.com/index.html",
            r#"<head><base href="http://example.com/docs/"></head><body><a href="page.html">p</a></body>"#,
        );

        assert_eq!(context.requested_urls(), ["http://example.com/docs/page.html"]);
        let (_, on_resolved) = context.take_requests().pop().unwrap();
        on_resolved(fetched("http://example.com/docs/page.html", "text/html"));

        let html = &context.stored()[0].1;
        assert!(html.contains(r#"<base href="http://example.com/docs/">"#));
        assert!(html.contains(r#"href="docs/page.html""#));
    }

    #[test]
    fn test_meta_refresh_follows_redirect_target() {
        let context = RecordingContext::scoped(&[]);
        open(
            &context,
            "http://example.com/",
            r#"<head><meta http-equiv="refresh" content="0; url=/moved"></head>"#,
        );

        assert_eq!(context.requested_urls(), ["http://example.com/moved"]);
        let (_, on_resolved) = context.take_requests().pop().unwrap();
        on_resolved(fetched("http://example.com/new/", "text/html"));

        let html = &context.stored()[0].1;
        assert!(html.contains(r#"content="0; url=new/index.html""#));
    }

    #[test]
    fn test_unreachable_target_still_completes_document() {
        let context = RecordingContext::scoped(&[]);
        open(&context, "http://example.com/", r#"<a href="/missing#part">gone</a>"#);

        assert_eq!(context.requested_urls(), ["http://example.com/missing"]);
        let (requested, on_resolved) = context.take_requests().pop().unwrap();
        on_resolved(Resolution::unreachable(requested));

        let html = &context.stored()[0].1;
        assert!(html.contains(r##"href="missing#part""##));
    }

    #[test]
    fn test_anchors_into_the_same_document_become_local() {
        let context = RecordingContext::scoped(&[]);
        open(
            &context,
            "http://example.com/about",
            r#"<a href="/about#team">team</a><a href="http://example.com/about#top">top</a><a href="/about">self</a>"#,
        );

        assert!(context.requested_urls().is_empty());
        let html = &context.stored()[0].1;
        assert!(html.contains(r##"<a href="#team">"##), "{html}");
        assert!(html.contains(r##"<a href="#top">"##), "{html}");
        assert!(html.contains(r#"<a href="/about">"#), "{html}");
    }

    #[test]
    fn test_extra_settlement_is_reported_as_defect() {
        let context = RecordingContext::scoped(&[]);
        let pending = open(&context, "http://example.com/", "<p>done</p>");
        assert_eq!(context.stored().len(), 1);

        pending.settle(1);
        assert_eq!(context.defects.load(Ordering::SeqCst), 1);
        assert_eq!(context.stored().len(), 1);
    }
}
