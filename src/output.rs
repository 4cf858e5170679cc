use chrono::{DateTime, Utc};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::{CanonicalStatus, Job};

/// Prints the forgewatch banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        style("⚡ forgewatch").magenta().bold(),
        style(env!("CARGO_PKG_VERSION")).dim(),
        style("Forgejo Pipeline Monitor").dim()
    );
}

/// Spinner shown while a discovery or refresh cycle is in flight.
pub fn cycle_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print the fleet status line and the job table.
pub fn print_jobs(
    jobs: &[Job],
    fleet: CanonicalStatus,
    last_update: Option<DateTime<Utc>>,
    refreshing: bool,
) {
    print_fleet_line(jobs, fleet, last_update, refreshing);

    if jobs.is_empty() {
        println!("{}", style("No jobs matched the current filters.").dim());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "", "Workflow", "Repository", "Branch", "Run", "Commit", "Author", "Age", "Duration",
            "History",
        ]);

    for job in jobs {
        let latest = &job.latest_run;
        table.add_row(vec![
            status_cell(job.status()),
            Cell::new(&job.workflow_name),
            Cell::new(&job.repo_full_name),
            Cell::new(&latest.head_branch),
            Cell::new(format!("#{}", latest.run_number)),
            Cell::new(truncate_message(&latest.commit_message, 40)),
            Cell::new(&latest.author),
            Cell::new(format_time_ago(latest.created_at)),
            Cell::new(format_duration(latest.started_at, latest.completed_at)),
            Cell::new(history_strip(job)),
        ]);
    }

    println!("{table}");
}

fn print_fleet_line(
    jobs: &[Job],
    fleet: CanonicalStatus,
    last_update: Option<DateTime<Utc>>,
    refreshing: bool,
) {
    let counts = |wanted: CanonicalStatus| jobs.iter().filter(|j| j.status() == wanted).count();
    let summary = format!(
        "{} jobs: ✓ {}  ✗ {}  ● {}",
        jobs.len(),
        counts(CanonicalStatus::Success),
        counts(CanonicalStatus::Failure),
        jobs.iter().filter(|j| j.status().is_active()).count(),
    );

    let headline = match fleet {
        CanonicalStatus::Failure => style(format!("✗ {summary} (failures)")).red().bold(),
        CanonicalStatus::Running | CanonicalStatus::Pending => {
            style(format!("● {summary} (in progress)")).blue()
        }
        CanonicalStatus::Success => style(format!("✓ {summary} (all passing)")).green(),
        _ => style(summary).dim(),
    };

    let mut trailer = match last_update {
        Some(at) => format!("(updated {})", format_time_ago(Some(at))),
        None => String::new(),
    };
    if refreshing {
        trailer.push_str(" ⟳ refreshing");
    }

    if trailer.is_empty() {
        println!("{headline}");
    } else {
        println!("{headline}  {}", style(trailer.trim_start()).dim());
    }
}

fn status_cell(status: CanonicalStatus) -> Cell {
    let color = match status {
        CanonicalStatus::Success => TableColor::Green,
        CanonicalStatus::Failure => TableColor::Red,
        CanonicalStatus::Running => TableColor::Blue,
        CanonicalStatus::Waiting | CanonicalStatus::Pending => TableColor::Yellow,
        _ => TableColor::Grey,
    };
    Cell::new(status.label()).fg(color)
}

/// Compact strip of the job's most recent runs, newest first.
fn history_strip(job: &Job) -> String {
    job.all_runs
        .iter()
        .take(8)
        .map(|run| match run.canonical_status() {
            CanonicalStatus::Success => '✓',
            CanonicalStatus::Failure => '✗',
            CanonicalStatus::Running | CanonicalStatus::Waiting | CanonicalStatus::Pending => '●',
            _ => '·',
        })
        .collect()
}

/// Print the discovery log to stderr.
pub fn print_discovery_log(entries: &[String]) {
    for entry in entries {
        eprintln!("  {}", style(entry).dim());
    }
}

/// Elapsed wall time between two instants, in compact "1h 4m" form.
pub fn format_duration(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> String {
    let Some(start) = start else {
        return "-".to_string();
    };
    let end = end.unwrap_or_else(Utc::now);
    let secs = (end - start).num_seconds().max(0);

    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Age of a timestamp relative to now, in coarse "5m ago" form.
pub fn format_time_ago(date: Option<DateTime<Utc>>) -> String {
    let Some(date) = date else {
        return "-".to_string();
    };
    let secs = (Utc::now() - date).num_seconds();

    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}

/// First line of a commit message, truncated with an ellipsis.
pub fn truncate_message(message: &str, max_length: usize) -> String {
    let first_line = message.lines().next().unwrap_or("");
    if first_line.is_empty() {
        return "-".to_string();
    }
    if first_line.chars().count() <= max_length {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(max_length).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_duration_buckets() {
        let start = Utc::now();
        assert_eq!(format_duration(None, None), "-");
        assert_eq!(format_duration(Some(start), Some(start + Duration::seconds(42))), "42s");
        assert_eq!(
            format_duration(Some(start), Some(start + Duration::seconds(125))),
            "2m 5s"
        );
        assert_eq!(
            format_duration(Some(start), Some(start + Duration::seconds(3900))),
            "1h 5m"
        );
    }

    #[test]
    fn test_format_time_ago_buckets() {
        assert_eq!(format_time_ago(None), "-");
        assert_eq!(format_time_ago(Some(Utc::now())), "just now");
        assert_eq!(
            format_time_ago(Some(Utc::now() - Duration::minutes(5))),
            "5m ago"
        );
        assert_eq!(
            format_time_ago(Some(Utc::now() - Duration::hours(3))),
            "3h ago"
        );
        assert_eq!(
            format_time_ago(Some(Utc::now() - Duration::days(2))),
            "2d ago"
        );
    }

    #[test]
    fn test_truncate_message_takes_first_line() {
        assert_eq!(truncate_message("Fix the bug\n\nLong body here", 40), "Fix the bug");
        assert_eq!(truncate_message("", 40), "-");
        assert_eq!(
            truncate_message("A very long commit subject line indeed", 10),
            "A very lon..."
        );
    }
}
