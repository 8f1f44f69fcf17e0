use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, StatusCode};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{BasicAuth, MirrorConfig};
use crate::error::MirrorError;
use crate::file_manager::FileManager;
use crate::paths::{get_paths, FilenamePolicy};
use crate::rewriter::{self, CrawlContext, OnResolved};
use crate::scope::DomainScope;

/// Assumed when a response carries no `Content-Type`.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Where a requested resource ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Final URL after redirects, or the requested URL if the fetch failed.
    pub url: String,
    /// `Content-Type` of the response; `None` if there was no response.
    pub content_type: Option<String>,
}

impl Resolution {
    pub fn fetched(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: Some(content_type.into()),
        }
    }

    pub fn unreachable(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
        }
    }
}

/// An absolute URL queued for fetching, with the scope it was found under.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub url: String,
    pub scope: Arc<DomainScope>,
}

impl CrawlTarget {
    pub fn new(url: impl Into<String>, scope: Arc<DomainScope>) -> Self {
        Self {
            url: url.into(),
            scope,
        }
    }
}

/// Counts of what a crawl did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub saved: usize,
    pub failed: usize,
    pub skipped_duplicates: usize,
    pub defects: usize,
}

impl fmt::Display for MirrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} failed, {} duplicate references",
            self.saved, self.failed, self.skipped_duplicates
        )?;
        if self.defects > 0 {
            write!(f, ", {} internal errors", self.defects)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CrawlStats {
    saved: AtomicUsize,
    failed: AtomicUsize,
    skipped_duplicates: AtomicUsize,
    defects: AtomicUsize,
}

impl CrawlStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MirrorSummary {
        MirrorSummary {
            saved: self.saved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_duplicates: self.skipped_duplicates.load(Ordering::Relaxed),
            defects: self.defects.load(Ordering::Relaxed),
        }
    }
}

/// A response whose headers have arrived; the body is read on demand.
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: String,
    response: reqwest::Response,
}

impl FetchedResponse {
    pub async fn body(self) -> crate::error::Result<Vec<u8>> {
        let url = self.final_url;
        self.response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|source| MirrorError::Transport { url, source })
    }
}

/// HTTP client configured once per crawl.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    basic_auth: Option<BasicAuth>,
}

impl HttpTransport {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .danger_accept_invalid_certs(config.ignore_ssl_errors)
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            basic_auth: config.basic_auth.clone(),
        })
    }

    /// Issues a GET, following redirects. Non-success statuses are errors.
    pub async fn get(&self, url: &str) -> crate::error::Result<FetchedResponse> {
        let mut request = self.client.get(url);
        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|source| MirrorError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        Ok(FetchedResponse {
            status,
            final_url: response.url().to_string(),
            content_type,
            response,
        })
    }
}

/// Held by every unit of outstanding work. The crawl is over once all
/// clones are gone; the first fatal error ends it early.
#[derive(Clone)]
struct WorkGuard {
    fatal: mpsc::UnboundedSender<MirrorError>,
}

impl WorkGuard {
    fn abort(&self, error: MirrorError) {
        // The receiver only goes away once the crawl has already ended.
        let _ = self.fatal.send(error);
    }
}

type Announcement = watch::Sender<Option<Resolution>>;

/// Delivers a fetch's resolution to its requester and to anyone waiting on
/// the same URL.
struct Reporter {
    announce: Option<Announcement>,
    on_resolved: Option<OnResolved>,
}

impl Reporter {
    fn report(self, resolution: Resolution) {
        if let Some(announce) = self.announce {
            announce.send_replace(Some(resolution.clone()));
        }
        if let Some(on_resolved) = self.on_resolved {
            on_resolved(resolution);
        }
    }
}

struct MirrorState {
    config: MirrorConfig,
    transport: HttpTransport,
    file_manager: FileManager,
    registry: Mutex<HashMap<String, watch::Receiver<Option<Resolution>>>>,
    stats: CrawlStats,
}

impl MirrorState {
    fn spawn_fetch(self: &Arc<Self>, guard: WorkGuard, target: CrawlTarget, on_resolved: Option<OnResolved>) {
        let announce = if self.config.refetch {
            None
        } else {
            let (sender, receiver) = watch::channel(None);
            let existing = {
                let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
                match registry.entry(target.url.clone()) {
                    Entry::Occupied(entry) => Some(entry.get().clone()),
                    Entry::Vacant(entry) => {
                        entry.insert(receiver);
                        None
                    }
                }
            };

            if let Some(receiver) = existing {
                debug!(url = %target.url, "already requested");
                CrawlStats::bump(&self.stats.skipped_duplicates);
                if let Some(on_resolved) = on_resolved {
                    tokio::spawn(wait_for_resolution(receiver, target.url, on_resolved, guard));
                }
                return;
            }
            Some(sender)
        };

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let reporter = Reporter {
                announce,
                on_resolved,
            };
            state.fetch(guard, target, reporter).await;
        });
    }

    async fn fetch(self: Arc<Self>, guard: WorkGuard, target: CrawlTarget, reporter: Reporter) {
        let response = match self.transport.get(&target.url).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %target.url, error = &err as &dyn Error, "download failed");
                CrawlStats::bump(&self.stats.failed);
                reporter.report(Resolution::unreachable(target.url));
                return;
            }
        };

        let final_url = response.final_url.clone();
        let content_type = response.content_type.clone();
        let resolution = Resolution::fetched(&final_url, &content_type);
        reporter.report(resolution.clone());

        if final_url != target.url && !self.claim_final_url(resolution) {
            debug!(requested = %target.url, url = %final_url, "already mirrored under its final URL");
            CrawlStats::bump(&self.stats.skipped_duplicates);
            return;
        }

        if response.status == StatusCode::NO_CONTENT || response.status == StatusCode::RESET_CONTENT {
            debug!(url = %final_url, status = %response.status, "nothing to save");
            return;
        }

        info!(url = %final_url, "downloading");
        let body = match response.body().await {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %final_url, error = &err as &dyn Error, "download failed");
                CrawlStats::bump(&self.stats.failed);
                return;
            }
        };

        if content_type.contains("html") {
            let context: Arc<dyn CrawlContext> = Arc::new(CrawlHandle {
                state: Arc::clone(&self),
                guard,
                scope: target.scope,
            });
            if let Err(err) = rewriter::rewrite_document(context, final_url, content_type, body) {
                warn!(error = &err as &dyn Error, "couldn't rewrite document");
                CrawlStats::bump(&self.stats.failed);
            }
        } else if let Err(err) = self.store(&final_url, &content_type, &body) {
            guard.abort(err);
        }
    }

    /// Registers the final URL of a redirected fetch. `false` if it was
    /// already known, in which case the body belongs to someone else.
    fn claim_final_url(&self, resolution: Resolution) -> bool {
        if self.config.refetch {
            return true;
        }
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        match registry.entry(resolution.url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let (_, receiver) = watch::channel(Some(resolution));
                entry.insert(receiver);
                true
            }
        }
    }

    fn store(&self, url: &str, content_type: &str, body: &[u8]) -> crate::error::Result<()> {
        let location = get_paths(url, content_type, self.config.filename_policy);
        let path = self.file_manager.save(&location, body)?;
        CrawlStats::bump(&self.stats.saved);
        info!(url, path = %path.display(), "saved");
        Ok(())
    }
}

async fn wait_for_resolution(
    mut receiver: watch::Receiver<Option<Resolution>>,
    requested: String,
    on_resolved: OnResolved,
    _guard: WorkGuard,
) {
    let resolution = receiver
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|seen| (*seen).clone())
        .unwrap_or_else(|| Resolution::unreachable(requested));
    on_resolved(resolution);
}

/// The view of the crawl handed to each HTML document.
struct CrawlHandle {
    state: Arc<MirrorState>,
    guard: WorkGuard,
    scope: Arc<DomainScope>,
}

impl CrawlContext for CrawlHandle {
    fn scope(&self) -> &Arc<DomainScope> {
        &self.scope
    }

    fn filename_policy(&self) -> FilenamePolicy {
        self.state.config.filename_policy
    }

    fn fetch(&self, target: CrawlTarget, on_resolved: OnResolved) {
        self.state
            .spawn_fetch(self.guard.clone(), target, Some(on_resolved));
    }

    fn store(&self, url: &str, content_type: &str, body: &[u8]) -> crate::error::Result<()> {
        self.state.store(url, content_type, body)
    }

    fn abort(&self, error: MirrorError) {
        self.guard.abort(error);
    }

    fn report_defect(&self, error: MirrorError) {
        error!(error = &error as &dyn Error, "internal consistency failure");
        CrawlStats::bump(&self.state.stats.defects);
    }
}

/// Mirrors one site, starting from the configured seed URL.
pub struct WebsiteMirror {
    state: Arc<MirrorState>,
}

impl WebsiteMirror {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let file_manager = FileManager::new(&config.output_dir)?;

        Ok(Self {
            state: Arc::new(MirrorState {
                config,
                transport,
                file_manager,
                registry: Mutex::new(HashMap::new()),
                stats: CrawlStats::default(),
            }),
        })
    }

    /// Runs the crawl to completion.
    ///
    /// Fails as soon as the output cannot be written; every other failure is
    /// logged and counted in the returned summary.
    pub async fn mirror_website(&self) -> Result<MirrorSummary> {
        let config = &self.state.config;
        println!("🚀 Starting website mirroring for: {}", config.seed_url.blue());
        println!("📁 Output directory: {:?}", config.output_dir);
        if config.scope.is_unrestricted() {
            println!("🌐 Domains: {}", "unrestricted".yellow());
        } else {
            println!("🌐 Domains: {}", config.scope.domains().join(", "));
        }

        let (fatal, mut fatal_errors) = mpsc::unbounded_channel();
        let seed = CrawlTarget::new(config.seed_url.clone(), Arc::new(config.scope.clone()));
        self.state.spawn_fetch(WorkGuard { fatal }, seed, None);

        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            progress_bar.set_style(style);
        }
        progress_bar.enable_steady_tick(Duration::from_millis(120));

        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let fatal_error = loop {
            tokio::select! {
                received = fatal_errors.recv() => break received,
                _ = ticker.tick() => progress_bar.set_message(self.state.stats.snapshot().to_string()),
            }
        };

        let summary = self.state.stats.snapshot();
        match fatal_error {
            Some(err) => {
                progress_bar.abandon_with_message(format!("❌ Mirroring aborted ({summary})"));
                Err(anyhow::Error::new(err).context("output could not be written, mirror aborted"))
            }
            None => {
                progress_bar.finish_with_message("✅ All downloads completed!");
                Ok(summary)
            }
        }
    }
}
