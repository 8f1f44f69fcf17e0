use std::path::PathBuf;
use std::time::Duration;

use crate::cli::MirrorCommand;
use crate::paths::FilenamePolicy;
use crate::scope::DomainScope;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows; U; Windows NT 6.1; chrome://navigator/locale/navigator.properties; rv:1.8.0.1) Gecko/20060126";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Everything a crawl needs to know, resolved from the command line.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub seed_url: String,
    pub output_dir: PathBuf,
    pub scope: DomainScope,
    pub ignore_ssl_errors: bool,
    pub user_agent: String,
    pub basic_auth: Option<BasicAuth>,
    pub filename_policy: FilenamePolicy,
    /// Fetch every reference anew instead of once per URL.
    pub refetch: bool,
    pub timeout: Duration,
}

impl MirrorConfig {
    /// A config with every option at its default.
    pub fn new(seed_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            seed_url: seed_url.into(),
            output_dir: output_dir.into(),
            scope: DomainScope::default(),
            ignore_ssl_errors: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            basic_auth: None,
            filename_policy: FilenamePolicy::for_host(),
            refetch: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_command(command: &MirrorCommand) -> Self {
        let basic_auth = match (&command.basic_auth_username, &command.basic_auth_password) {
            (None, None) => None,
            (username, password) => Some(BasicAuth {
                username: username.clone().unwrap_or_default(),
                password: password.clone().unwrap_or_default(),
            }),
        };

        let filename_policy = if command.sanitize_filenames {
            FilenamePolicy::Sanitize
        } else {
            FilenamePolicy::for_host()
        };

        Self {
            seed_url: seed_url_for(&command.site),
            output_dir: command.output_directory.clone(),
            scope: DomainScope::new(&command.domains),
            ignore_ssl_errors: command.ignore_ssl_errors,
            user_agent: command.user_agent.clone(),
            basic_auth,
            filename_policy,
            refetch: command.refetch,
            timeout: Duration::from_secs(command.timeout),
        }
    }
}

/// The seed is always fetched over plain HTTP; servers redirect as needed.
pub fn seed_url_for(site: &str) -> String {
    let site = site.trim().trim_end_matches('/');
    format!("http://{site}/")
}
