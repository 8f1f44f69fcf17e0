pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod file_manager;
pub mod html_parser;
pub mod logging;
pub mod mime_ext;
pub mod paths;
pub mod rewriter;
pub mod scope;
pub mod urls;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use config::{BasicAuth, MirrorConfig};
pub use downloader::{MirrorSummary, WebsiteMirror};
pub use error::MirrorError;
pub use file_manager::FileManager;
pub use logging::init_logging;
pub use paths::{get_paths, relative_link, FilenamePolicy, LocalPath};
pub use scope::{in_scope, DomainScope};
