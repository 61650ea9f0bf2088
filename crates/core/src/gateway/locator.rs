//! Repository locator parsing.
//!
//! Users name repositories as `owner/name`, as a browser URL, or as an SSH
//! remote. The web host is derived from the configured API URL so GitHub
//! Enterprise Server hosts are accepted alongside github.com.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::errors::LocatorError;

/// `owner/name` pair parsed from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocator {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"))
}

fn ssh_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:ssh://)?git@([^:/]+)[:/]([^/]+)/([^/]+?)(?:\.git)?/?$").expect("static regex")
    })
}

impl RepoLocator {
    /// Parse `input` against the host implied by `api_url`.
    ///
    /// Accepted forms:
    /// - `owner/name`
    /// - `https://<host>/owner/name[.git][/tree/...]`
    /// - `git@<host>:owner/name.git`
    pub fn parse(input: &str, api_url: &str) -> Result<Self, LocatorError> {
        let input = input.trim();
        let unrecognized = || LocatorError::Unrecognized(input.to_string());

        if let Some(caps) = ssh_re().captures(input) {
            check_host(&caps[1], api_url)?;
            return Self::from_parts(&caps[2], &caps[3]).ok_or_else(unrecognized);
        }

        if let Some((_, rest)) = input.split_once("://") {
            let mut parts = rest.split('/');
            let host = parts.next().unwrap_or_default();
            check_host(host, api_url)?;
            let owner = parts.next().unwrap_or_default();
            let name = parts.next().unwrap_or_default();
            return Self::from_parts(owner, name.trim_end_matches(".git")).ok_or_else(unrecognized);
        }

        let mut parts = input.trim_end_matches('/').split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => {
                Self::from_parts(owner, name.trim_end_matches(".git")).ok_or_else(unrecognized)
            }
            _ => Err(unrecognized()),
        }
    }

    fn from_parts(owner: &str, name: &str) -> Option<Self> {
        if segment_re().is_match(owner) && segment_re().is_match(name) {
            Some(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            })
        } else {
            None
        }
    }
}

fn check_host(host: &str, api_url: &str) -> Result<(), LocatorError> {
    let expected = web_host(api_url);
    let host = host.rsplit('@').next().unwrap_or(host);
    if host.eq_ignore_ascii_case(&expected) {
        Ok(())
    } else {
        Err(LocatorError::ForeignHost {
            host: host.to_string(),
            expected,
        })
    }
}

/// Derive the browser base URL from an API URL.
///
/// - `https://api.github.com` → `https://github.com`
/// - `https://<host>/api/v3`  → `https://<host>`
/// - anything else            → the API URL without a trailing slash
pub fn derive_web_base_url(api_url: &str) -> String {
    let url = api_url.trim().trim_end_matches('/');

    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }
    if let Some(base) = url.strip_suffix("/api/v3") {
        return base.to_string();
    }
    url.to_string()
}

/// Host part of [`derive_web_base_url`], lowercased.
pub fn web_host(api_url: &str) -> String {
    let base = derive_web_base_url(api_url);
    let without_scheme = base.split_once("://").map(|(_, r)| r).unwrap_or(&base);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Browser URL of a repository.
pub fn repo_web_url(api_url: &str, owner: &str, name: &str) -> String {
    format!("{}/{}/{}", derive_web_base_url(api_url), owner, name)
}
