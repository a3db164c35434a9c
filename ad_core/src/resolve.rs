//! Source resolution across mirrors.
//!
//! Turns a package's manifest into the ordered list of URLs the transfer
//! engine will try:
//!
//! 1. **Key selection**: pick exactly one manifest entry, by locale or by the
//!    installed package version when running as an update
//! 2. **Host classification**: known hosts expand across their mirror set,
//!    anything else is a direct (possibly private, credentialed) source
//! 3. **Redirection**: when forced, or when only IPv6 is available, URLs are
//!    routed through the redirect endpoint with the original URL encoded
//! 4. **De-duplication**: a URL is listed at most once (case-insensitive)

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use url::{Host, Url};

use crate::candidate::{Credentials, SourceCandidate};
use crate::config::SourcesConfig;
use crate::manifest::{ManifestFile, PackageSpec};

/// Which manifest entry a run is interested in.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub locale: &'a str,
    /// Version recorded in the installed package's metadata, if any
    pub installed_version: Option<&'a str>,
    pub update_mode: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectPolicy {
    pub forced: bool,
    pub ipv4_available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSources {
    pub candidates: Vec<SourceCandidate>,
    /// File name shared by every candidate's download
    pub file_name: Option<String>,
    pub credentials: Option<Credentials>,
    pub selected_key: Option<String>,
}

pub struct SourceResolver<'a> {
    config: &'a SourcesConfig,
    policy: RedirectPolicy,
}

impl<'a> SourceResolver<'a> {
    pub fn new(config: &'a SourcesConfig, policy: RedirectPolicy) -> Self {
        Self { config, policy }
    }

    pub fn resolve(&self, package: &PackageSpec, selection: &Selection<'_>) -> ResolvedSources {
        let mut resolved = ResolvedSources::default();

        let Some((key, files)) = select_entry(package, selection) else {
            return resolved;
        };
        resolved.selected_key = Some(key.to_string());

        for file in files {
            if resolved.file_name.is_none() {
                match file_name_of(&file.url) {
                    Some(name) => resolved.file_name = Some(name),
                    None => continue,
                }
            }

            let short = short_host(&file.url);
            match self.config.known_host(&short) {
                Some(host) => {
                    let prefix = host_prefix(&file.url, &short);
                    for mirror in &host.mirrors {
                        let url = match &prefix {
                            Some(prefix) if !prefix.eq_ignore_ascii_case(mirror) => {
                                format!("{}{}", mirror, &file.url[prefix.len()..])
                            }
                            _ => file.url.clone(),
                        };
                        let candidate = self.finish(url, file, &host.user_agent);
                        push_unique(&mut resolved.candidates, candidate);
                    }
                }
                None => {
                    let mut url = file.url.clone();
                    if let Some(key) = package.server_key.as_deref()
                        && let Some(source) = self.config.private_source(key)
                    {
                        if !is_absolute(&url) {
                            url = join_url(&source.host_prefix, &url);
                        }
                        resolved.credentials =
                            Some(Credentials::new(&source.username, &source.password));
                    }
                    let candidate = self.finish(url, file, &self.config.user_agents.default);
                    push_unique(&mut resolved.candidates, candidate);
                }
            }
        }

        resolved
    }

    fn finish(&self, url: String, file: &ManifestFile, user_agent: &str) -> SourceCandidate {
        if self.should_redirect(&url) {
            return SourceCandidate::new(
                redirect_url(&self.config.redirect_endpoint, &url),
                &file.hash,
                &self.config.user_agents.internal,
            );
        }
        SourceCandidate::new(url, &file.hash, user_agent)
    }

    fn should_redirect(&self, url: &str) -> bool {
        if self.policy.forced {
            return true;
        }
        if self.policy.ipv4_available {
            return false;
        }
        let short = short_host(url);
        !short.is_empty() && !self.config.is_internal(&short)
    }
}

/// Pick the single manifest entry this run installs from.
pub fn select_entry<'p>(
    package: &'p PackageSpec,
    selection: &Selection<'_>,
) -> Option<(&'p str, &'p [ManifestFile])> {
    let mut manifest = &package.download;
    let mut version = None;

    if selection.update_mode
        && let Some(update) = &package.update
        && update.all_urls_absolute()
    {
        version = selection.installed_version.filter(|v| !v.is_empty());
        if let Some(v) = version
            && update.contains_key(v)
        {
            manifest = update;
        }
    }

    manifest.entries().find(|(key, _)| {
        key.eq_ignore_ascii_case(selection.locale)
            || version.is_some_and(|v| key.eq_ignore_ascii_case(v))
    })
}

/// Host name reduced to its last two labels; IP literals are kept whole.
///
/// Returns an empty string for relative or unparsable URLs.
pub fn short_host(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            let labels: Vec<&str> = domain.split('.').collect();
            if labels.len() <= 2 {
                domain.to_ascii_lowercase()
            } else {
                labels[labels.len() - 2..].join(".").to_ascii_lowercase()
            }
        }
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => format!("[{addr}]"),
        None => String::new(),
    }
}

/// The part of `url` up to and including the first occurrence of `short_host`.
pub fn host_prefix(url: &str, short_host: &str) -> Option<String> {
    if short_host.is_empty() {
        return None;
    }
    let idx = url
        .to_ascii_lowercase()
        .find(&short_host.to_ascii_lowercase())?;
    Some(url[..idx + short_host.len()].to_string())
}

/// Route `url` through the redirect endpoint.
pub fn redirect_url(endpoint: &str, url: &str) -> String {
    format!("{}{}", endpoint, URL_SAFE_NO_PAD.encode(url.as_bytes()))
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, name) = without_scheme.rsplit_once('/')?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn join_url(prefix: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches(['/', '\\']),
        relative.trim_start_matches(['/', '\\']).replace('\\', "/")
    )
}

fn push_unique(candidates: &mut Vec<SourceCandidate>, candidate: SourceCandidate) {
    if candidates
        .iter()
        .any(|c| c.url.eq_ignore_ascii_case(&candidate.url))
    {
        return;
    }
    candidates.push(candidate);
}
