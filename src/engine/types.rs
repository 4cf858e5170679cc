use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::status::CanonicalStatus;

/// A repository discovered for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identifier for the repository
    pub id: i64,
    /// Full name in "owner/name" form
    pub full_name: String,
    /// Short repository name
    pub name: String,
    /// Owning user or organization
    pub owner: RepoOwner,
}

/// Owner sub-object of a repository. Older Forgejo versions expose `username`
/// where newer ones expose `login`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoOwner {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Repository {
    /// Owner account name, preferring `login` over the legacy `username`.
    pub fn owner_name(&self) -> &str {
        non_empty(self.owner.login.as_deref())
            .or_else(|| non_empty(self.owner.username.as_deref()))
            .unwrap_or("")
    }
}

/// A workflow run as received from the API, before field reconciliation.
///
/// Field names vary across server versions: the branch may arrive as
/// `head_branch` or `prettyref`, the creation time as `created_at` or
/// `created`, the sequence number as `run_number` or `index_in_repo`.
/// Every field is optional and deserialized leniently so one malformed run
/// never poisons a whole page. The embedded `repository` sub-object is not
/// modeled at all: repository identity is supplied by the caller, never
/// trusted from the run payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRun {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    /// Legacy alias for `head_branch`
    #[serde(default)]
    pub prettyref: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    /// Legacy alias for `created_at`
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_number: Option<i64>,
    /// Legacy alias for `run_number`
    #[serde(default)]
    pub index_in_repo: Option<i64>,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Workflow file reference, e.g. ".forgejo/workflows/build.yml@refs/heads/main"
    #[serde(default)]
    pub workflow_ref: Option<String>,
    /// Display name of the workflow
    #[serde(default)]
    pub name: Option<String>,
    /// Raw workflow identifier; a string on recent servers, a number on old ones
    #[serde(default, deserialize_with = "lenient_string")]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub trigger_actor: Option<Actor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub login: Option<String>,
}

impl RawRun {
    /// Resolve the logical workflow name for this run.
    ///
    /// Prefers the path segment of `workflow_ref` (with the `.yml`/`.yaml`
    /// suffix stripped), then the display name, then the raw workflow id,
    /// then the literal "unknown".
    pub fn workflow_name(&self) -> String {
        if let Some(reference) = non_empty(self.workflow_ref.as_deref()) {
            if let Some(idx) = reference.find("workflows/") {
                let tail = &reference[idx + "workflows/".len()..];
                let file = tail.split('@').next().unwrap_or(tail);
                if !file.is_empty() {
                    return file
                        .trim_end_matches(".yaml")
                        .trim_end_matches(".yml")
                        .to_string();
                }
            }
        }
        if let Some(name) = non_empty(self.name.as_deref()) {
            return name.to_string();
        }
        if let Some(id) = non_empty(self.workflow_id.as_deref()) {
            return id.to_string();
        }
        "unknown".to_string()
    }

    /// Reconcile this raw record into a [`NormalizedRun`], attaching the
    /// caller-supplied repository identity.
    ///
    /// Each logical field takes the first non-empty value across its modern
    /// name and legacy aliases. Idempotent: a record that already carries the
    /// modern fields passes through unchanged.
    pub fn normalize(self, repo: &Repository) -> NormalizedRun {
        let workflow_name = self.workflow_name();
        let commit_author = self.head_commit.as_ref().and_then(|c| c.author.as_ref());

        let author = commit_author
            .and_then(|a| filled(a.name.as_ref()))
            .or_else(|| commit_author.and_then(|a| filled(a.login.as_ref())))
            .or_else(|| self.actor.as_ref().and_then(|a| filled(a.login.as_ref())))
            .or_else(|| {
                self.trigger_actor
                    .as_ref()
                    .and_then(|a| filled(a.login.as_ref()))
            })
            .unwrap_or_default();

        let commit_message = self
            .head_commit
            .as_ref()
            .and_then(|c| filled(c.message.as_ref()))
            .or_else(|| filled(self.display_title.as_ref()))
            .or_else(|| filled(self.title.as_ref()))
            .unwrap_or_default();

        let head_sha = filled(self.head_sha.as_ref())
            .or_else(|| self.head_commit.as_ref().and_then(|c| filled(c.id.as_ref())))
            .unwrap_or_default();

        NormalizedRun {
            id: self.id,
            status: self.status,
            conclusion: self.conclusion.filter(|c| !c.is_empty()),
            head_branch: filled(self.head_branch.as_ref())
                .or_else(|| filled(self.prettyref.as_ref()))
                .unwrap_or_default(),
            head_sha,
            created_at: self.created_at.or(self.created),
            started_at: self.started_at,
            completed_at: self.completed_at,
            run_number: self.run_number.or(self.index_in_repo).unwrap_or(0),
            commit_message,
            author,
            workflow_name: workflow_name.clone(),
            repo_full_name: repo.full_name.clone(),
            job_path: format!("{}/{}", repo.full_name, workflow_name),
        }
    }
}

/// Canonical run record produced by normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRun {
    pub id: i64,
    pub status: String,
    pub conclusion: Option<String>,
    /// Branch name; empty when no source field carried one
    pub head_branch: String,
    pub head_sha: String,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub run_number: i64,
    pub commit_message: String,
    pub author: String,
    pub workflow_name: String,
    pub repo_full_name: String,
    /// Job identity: "{repo_full_name}/{workflow_name}"
    pub job_path: String,
}

impl NormalizedRun {
    pub fn canonical_status(&self) -> CanonicalStatus {
        CanonicalStatus::from_run(&self.status, self.conclusion.as_deref())
    }
}

/// Aggregated view of one workflow within one repository: the latest run plus
/// a bounded, newest-first history. Jobs are derived views, recomputed from
/// the current run set on every aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub job_path: String,
    pub repo_full_name: String,
    pub workflow_name: String,
    pub latest_run: NormalizedRun,
    pub all_runs: Vec<NormalizedRun>,
}

impl Job {
    pub fn status(&self) -> CanonicalStatus {
        self.latest_run.canonical_status()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn filled(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

/// Accepts RFC 3339 strings, treating absent, empty, or unparseable values as
/// missing rather than failing the whole record.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

/// Accepts either a string or a number, since `workflow_id` changed type
/// between server versions.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}
