//! Pull-request link extraction from free-form chat text.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::state::{QueueEntry, UNKNOWN_REPO};

/// Host whose links are queued.
pub const CODE_HOST: &str = "github.com";

/// Maximum number of characters of the submitting message kept as excerpt.
pub const EXCERPT_LIMIT: usize = 100;

/// Permissive URL grammar. Slack wraps links as `<url>` or `<url|label>`,
/// so the angle brackets and the label separator terminate a match.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>|"`{}]+"#).expect("URL pattern is a valid regex")
});

/// A chat message that may carry pull-request links.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub text: &'a str,
    pub submitter_id: &'a str,
    pub permalink: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub submitted_at: &'a str,
}

/// Builds queue entries from messages, resolving repo labels against an
/// ordered allow-list.
///
/// The allow-list is matched by substring, first match wins, so a more
/// specific identifier must be listed before any identifier it contains.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    repos: Vec<String>,
}

impl Extractor {
    pub fn new(repos: Vec<String>) -> Self {
        Self { repos }
    }

    pub fn repos(&self) -> &[String] {
        &self.repos
    }

    /// Links in `text` that point at the code host.
    pub fn qualifying_links(&self, text: &str) -> Vec<String> {
        find_links(text)
            .into_iter()
            .filter(|link| is_code_host_link(link))
            .collect()
    }

    pub fn resolve_repo(&self, link: &str) -> String {
        self.repos
            .iter()
            .find(|repo| !repo.is_empty() && link.contains(repo.as_str()))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_REPO.to_string())
    }

    /// One entry per qualifying link; all entries share the message excerpt.
    /// An empty result means the message is not a submission.
    pub fn extract(&self, submission: &Submission<'_>) -> Vec<QueueEntry> {
        let links = self.qualifying_links(submission.text);
        if links.is_empty() {
            return Vec::new();
        }

        let excerpt = excerpt_before_first_link(submission.text);
        links
            .into_iter()
            .map(|link| QueueEntry {
                submitter_id: submission.submitter_id.to_string(),
                repo_label: self.resolve_repo(&link),
                link_url: link,
                excerpt: excerpt.clone(),
                source_permalink: submission.permalink.map(str::to_string),
                submitter_avatar_url: submission.avatar_url.map(str::to_string),
                submitted_at: submission.submitted_at.to_string(),
                index: 0,
            })
            .collect()
    }
}

/// Every URL in `text`, in order of appearance, without Slack decoration.
pub fn find_links(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_code_host_link(link: &str) -> bool {
    match Url::parse(link) {
        Ok(url) => matches!(
            url.host_str(),
            Some(host) if host.eq_ignore_ascii_case(CODE_HOST)
                || host.eq_ignore_ascii_case(&format!("www.{}", CODE_HOST))
        ),
        Err(_) => false,
    }
}

/// Text preceding the first link, trimmed, with continuation lines quoted
/// and cut to [`EXCERPT_LIMIT`] characters.
pub fn excerpt_before_first_link(text: &str) -> String {
    let prefix = match URL_PATTERN.find(text) {
        Some(m) => {
            let before = &text[..m.start()];
            before.strip_suffix('<').unwrap_or(before)
        }
        None => text,
    };

    prefix
        .trim()
        .replace('\n', "\n> ")
        .chars()
        .take(EXCERPT_LIMIT)
        .collect()
}
