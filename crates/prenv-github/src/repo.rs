//! Repository references.
//!
//! Configuration names repositories loosely (`owner/repo`, `host/owner/repo`
//! or a full URL). Git needs a clone URL and the REST API needs owner/name, so
//! both directions live here.

use std::fmt;

use crate::error::GitHubError;
use crate::Result;

/// An `owner/name` pair on a GitHub host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/repo` (the form of `GITHUB_REPOSITORY`).
    pub fn parse(s: &str) -> Result<Self> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(*owner, *name))
            }
            _ => Err(GitHubError::InvalidRepository(format!(
                "{s}: repository must be in the form of owner/repo"
            ))),
        }
    }

    /// Recover owner and name from the last two path segments of a clone URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let trimmed = url.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut segments = trimmed.rsplit('/');
        match (segments.next(), segments.next()) {
            (Some(name), Some(owner))
                if !name.is_empty() && !owner.is_empty() && !owner.ends_with(':') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(GitHubError::InvalidRepository(url.to_string())),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Turn a configured repository reference into a clone URL.
///
/// - `owner/repo` is resolved against `web_base_url` (github.com or an
///   enterprise host) and gets a `.git` suffix
/// - `host/owner/repo` becomes `https://host/owner/repo.git`
/// - `https://`, `http://` and `file://` URLs are used as-is
pub fn clone_url(reference: &str, web_base_url: &str) -> Result<String> {
    if is_url(reference) {
        return Ok(reference.to_string());
    }

    check_reference(reference)?;
    if reference.matches('/').count() == 1 {
        let base = web_base_url.trim_end_matches('/');
        Ok(format!("{base}/{reference}.git"))
    } else {
        Ok(format!("https://{reference}.git"))
    }
}

/// Accepts exactly what [`clone_url`] can resolve, without resolving it.
pub fn check_reference(reference: &str) -> Result<()> {
    if is_url(reference) {
        return Ok(());
    }
    let segments: Vec<&str> = reference.split('/').collect();
    let well_formed = matches!(segments.len(), 2 | 3)
        && segments
            .iter()
            .all(|s| !s.is_empty() && !s.contains(char::is_whitespace));
    if !well_formed {
        return Err(GitHubError::InvalidRepository(format!(
            "{reference}: expected owner/repo, host/owner/repo or a URL"
        )));
    }
    Ok(())
}

fn is_url(reference: &str) -> bool {
    reference.starts_with("https://")
        || reference.starts_with("http://")
        || reference.starts_with("file://")
}
