use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULT_USER_AGENT;

#[derive(Parser, Debug)]
#[command(
    name = "website-mirror",
    about = "A CLI utility to mirror websites by downloading static copies",
    version,
    long_about = "Downloads a static copy of a website, following every link, image, script and stylesheet it references. Links inside saved pages are rewritten to point at the local copies."
)]
pub struct MirrorCommand {
    /// Site to mirror, without the protocol (e.g. example.com/docs)
    #[arg(short = 's', long = "site")]
    pub site: String,

    /// Accept invalid or self-signed TLS certificates
    #[arg(short = 'i', long = "ignoreSslErrors", alias = "ignore-ssl-errors")]
    pub ignore_ssl_errors: bool,

    /// Only follow links to these domains and their subdomains
    #[arg(short = 'd', long = "domains", alias = "domain", num_args = 1..)]
    pub domains: Vec<String>,

    /// Directory the mirror is written to
    #[arg(short = 'o', long = "outputDirectory", alias = "output-directory", default_value = ".")]
    pub output_directory: PathBuf,

    /// User agent string to use for requests
    #[arg(short = 'u', long = "userAgent", alias = "user-agent", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Username for HTTP basic authentication
    #[arg(long = "basicAuthUsername", visible_alias = "user", alias = "basic-auth-username")]
    pub basic_auth_username: Option<String>,

    /// Password for HTTP basic authentication
    #[arg(long = "basicAuthPassword", visible_alias = "pass", alias = "basic-auth-password")]
    pub basic_auth_password: Option<String>,

    /// Fetch a URL again every time it is referenced
    #[arg(long)]
    pub refetch: bool,

    /// Replace characters Windows rejects in file names
    #[arg(long = "sanitizeFilenames", alias = "sanitize-filenames")]
    pub sanitize_filenames: bool,

    /// Timeout for requests in seconds
    #[arg(long, default_value = "120", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Log every request
    #[arg(short, long)]
    pub verbose: bool,
}
