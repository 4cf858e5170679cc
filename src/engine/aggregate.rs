use std::cmp::Reverse;

use indexmap::IndexMap;
use log::warn;
use regex::Regex;

use super::discover::{compile_pattern, match_all};
use super::status::CanonicalStatus;
use super::types::{Job, NormalizedRun};

/// Maximum runs retained per job, newest first.
pub(crate) const MAX_JOB_HISTORY: usize = 15;

/// Filter runs by workflow and branch pattern, then group them into jobs.
///
/// Patterns compile case-insensitively. An invalid or empty workflow pattern
/// degrades to match-all; an invalid or empty branch pattern degrades to no
/// branch filter at all (which, unlike a match-all regex, also accepts runs
/// with no branch). A run is retained when its workflow name or job path
/// matches the workflow pattern and its branch passes the branch filter.
///
/// Grouping is insertion-ordered by job path; each group is sorted newest
/// first, truncated to [`MAX_JOB_HISTORY`], and headed by its latest run.
/// The job list is stably sorted by descending status priority, so failures
/// surface first and equal-priority jobs keep their discovery order.
pub fn aggregate(runs: &[NormalizedRun], workflow_pattern: &str, branch_pattern: &str) -> Vec<Job> {
    let workflow_regex = if workflow_pattern.is_empty() {
        match_all()
    } else {
        compile_pattern(workflow_pattern).unwrap_or_else(|err| {
            warn!("invalid workflow pattern, matching all workflows: {err}");
            match_all()
        })
    };

    let branch_regex: Option<Regex> = if branch_pattern.is_empty() {
        None
    } else {
        compile_pattern(branch_pattern)
            .map_err(|err| warn!("invalid branch pattern, branch filter disabled: {err}"))
            .ok()
    };

    let mut groups: IndexMap<String, Vec<NormalizedRun>> = IndexMap::new();
    for run in runs {
        let workflow_matches = workflow_regex.is_match(&run.workflow_name)
            || workflow_regex.is_match(&run.job_path);
        if !workflow_matches {
            continue;
        }
        if let Some(regex) = &branch_regex {
            if !regex.is_match(&run.head_branch) {
                continue;
            }
        }
        groups.entry(run.job_path.clone()).or_default().push(run.clone());
    }

    let mut jobs: Vec<Job> = groups
        .into_iter()
        .map(|(job_path, mut group)| {
            group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            group.truncate(MAX_JOB_HISTORY);
            let latest_run = group[0].clone();
            Job {
                job_path,
                repo_full_name: latest_run.repo_full_name.clone(),
                workflow_name: latest_run.workflow_name.clone(),
                latest_run,
                all_runs: group,
            }
        })
        .collect();

    jobs.sort_by_key(|job| Reverse(job.status().priority()));
    jobs
}

/// Fold per-job statuses into one fleet-level status: any failure wins, then
/// any in-flight run, then all-green; anything else is unknown.
pub fn fleet_status(jobs: &[Job]) -> CanonicalStatus {
    if jobs.is_empty() {
        return CanonicalStatus::Unknown;
    }
    let statuses: Vec<CanonicalStatus> = jobs.iter().map(Job::status).collect();

    if statuses.contains(&CanonicalStatus::Failure) {
        return CanonicalStatus::Failure;
    }
    if statuses.contains(&CanonicalStatus::Running) {
        return CanonicalStatus::Running;
    }
    if statuses
        .iter()
        .any(|s| matches!(s, CanonicalStatus::Pending | CanonicalStatus::Waiting))
    {
        return CanonicalStatus::Pending;
    }
    if statuses.iter().all(|s| *s == CanonicalStatus::Success) {
        return CanonicalStatus::Success;
    }
    CanonicalStatus::Unknown
}
