/// The set of domains a crawl may reach.
///
/// An empty set means no restriction. Otherwise a host is in scope when it
/// equals an allowed domain or is a subdomain of one.
#[derive(Debug, Clone, Default)]
pub struct DomainScope {
    allowed: Vec<String>,
}

impl DomainScope {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = domains
            .into_iter()
            .map(|domain| domain.as_ref().trim().trim_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn domains(&self) -> &[String] {
        &self.allowed
    }

    pub fn contains(&self, host: &str) -> bool {
        in_scope(host, &self.allowed)
    }
}

/// Whether `host` is one of `allowed` or a subdomain of one of them.
///
/// A `:port` suffix on `host` is ignored.
pub fn in_scope(host: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }

    let host = strip_port(host).to_ascii_lowercase();
    allowed.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
