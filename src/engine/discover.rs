use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use super::client::ForgejoClient;
use super::types::Repository;
use super::DiscoveryLog;
use crate::error::{ForgeWatchError, Result};

const REPO_PAGE_LIMIT: usize = 50;
const SEARCH_LIMIT: usize = 100;
const SEARCH_TERM_MAX: usize = 20;

impl ForgejoClient {
    /// List every repository of an organization, paginating until a short or
    /// empty page.
    pub(super) async fn list_org_repos(&self, org: &str) -> Result<Vec<Repository>> {
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let value = self
                .call(&format!("/orgs/{org}/repos?page={page}&limit={REPO_PAGE_LIMIT}"))
                .await?;
            let batch: Vec<Repository> = serde_json::from_value(value)?;
            let fetched = batch.len();
            if fetched == 0 {
                break;
            }
            repos.extend(batch);
            if fetched < REPO_PAGE_LIMIT {
                break;
            }
            page += 1;
        }

        Ok(repos)
    }

    /// Full-text repository search. The response is either a bare array or
    /// wrapped in `{data: [...]}` depending on server version.
    pub(super) async fn search_repos(&self, term: &str) -> Result<Vec<Repository>> {
        let query: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
        let value = self
            .call(&format!("/repos/search?q={query}&limit={SEARCH_LIMIT}"))
            .await?;
        let items = value.get("data").cloned().unwrap_or(value);
        Ok(serde_json::from_value(items)?)
    }
}

/// Resolve the set of repositories to monitor.
///
/// Unions organization listings with a coarse full-text search derived from
/// the repository pattern, deduplicates by repository id, then keeps only
/// repositories whose full or short name matches the pattern. Failures are
/// per-unit: a broken organization or search is logged and contributes zero
/// results without aborting the cycle.
pub async fn discover_repos(
    client: &ForgejoClient,
    organizations: &[String],
    repo_pattern: &str,
    log: &mut DiscoveryLog,
) -> Vec<Repository> {
    let mut seen_ids = HashSet::new();
    let mut candidates: Vec<Repository> = Vec::new();

    for org in organizations {
        log.push(format!("scanning organization {org}"));
        match client.list_org_repos(org).await {
            Ok(repos) => {
                log.push(format!("  {} repositories in {org}", repos.len()));
                candidates.extend(repos.into_iter().filter(|r| seen_ids.insert(r.id)));
            }
            Err(err) => log.push(format!("organization {org} failed: {err}")),
        }
    }

    if let Some(term) = search_term(repo_pattern) {
        log.push(format!("searching repositories matching \"{term}\""));
        match client.search_repos(&term).await {
            Ok(found) => {
                log.push(format!("  {} repositories from search", found.len()));
                candidates.extend(found.into_iter().filter(|r| seen_ids.insert(r.id)));
            }
            Err(err) => log.push(format!("repository search failed: {err}")),
        }
    }

    let regex = compile_pattern(repo_pattern).unwrap_or_else(|err| {
        log.push(format!("invalid repository pattern, matching all: {err}"));
        match_all()
    });

    let matching: Vec<Repository> = candidates
        .into_iter()
        .filter(|repo| regex.is_match(&repo.full_name) || regex.is_match(&repo.name))
        .collect();

    log.push(format!("{} repositories match the pattern", matching.len()));
    matching
}

/// Compile a user-supplied pattern case-insensitively.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ForgeWatchError::Pattern(e.to_string()))
}

pub(crate) fn match_all() -> Regex {
    Regex::new(".*").unwrap()
}

/// Derive a coarse literal search term from a repository regex: drop `.*`
/// tokens and regex metacharacters, keep `[A-Za-z0-9_-]`, cap the length.
/// Returns None when the pattern is trivial or too little survives.
fn search_term(repo_pattern: &str) -> Option<String> {
    if repo_pattern.is_empty() || repo_pattern == ".*" {
        return None;
    }
    let term: String = repo_pattern
        .replace(".*", "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(SEARCH_TERM_MAX)
        .collect();
    (term.len() >= 2).then_some(term)
}
