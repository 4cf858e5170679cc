use serde::{Deserialize, Serialize};

/// Canonical classification of a workflow run, independent of how the server
/// spells it.
///
/// Forgejo reports a `status` string plus, for completed runs, a `conclusion`
/// string. Both collapse into this one enum so the rest of the engine never
/// inspects raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    Success,
    Failure,
    Cancelled,
    Running,
    Waiting,
    Pending,
    Skipped,
    Unknown,
}

impl CanonicalStatus {
    /// Sort priority: higher means more urgent. Failures always surface
    /// first, in-flight runs next, terminal non-failures last.
    pub fn priority(self) -> u8 {
        match self {
            Self::Failure => 4,
            Self::Running | Self::Waiting | Self::Pending => 3,
            Self::Cancelled => 2,
            Self::Success | Self::Skipped => 1,
            Self::Unknown => 0,
        }
    }

    /// Human-readable label for presentation.
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::Pending => "Pending",
            Self::Skipped => "Skipped",
            Self::Unknown => "Unknown",
        }
    }

    /// Classify a run from its raw `(status, conclusion)` pair.
    ///
    /// A `completed` status defers to the conclusion; anything else is
    /// classified by the status itself. Unrecognized values map to `Unknown`.
    pub fn from_run(status: &str, conclusion: Option<&str>) -> Self {
        if status == "completed" {
            return conclusion.and_then(Self::parse).unwrap_or(Self::Unknown);
        }
        Self::parse(status).unwrap_or(Self::Unknown)
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "cancelled" => Some(Self::Cancelled),
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "pending" => Some(Self::Pending),
            "skipped" => Some(Self::Skipped),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// True for runs that are still in flight.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Waiting | Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CanonicalStatus; 8] = [
        CanonicalStatus::Success,
        CanonicalStatus::Failure,
        CanonicalStatus::Cancelled,
        CanonicalStatus::Running,
        CanonicalStatus::Waiting,
        CanonicalStatus::Pending,
        CanonicalStatus::Skipped,
        CanonicalStatus::Unknown,
    ];

    #[test]
    fn test_priority_ordering_is_total() {
        for status in ALL {
            assert!(status.priority() <= 4);
        }
        assert!(CanonicalStatus::Failure.priority() > CanonicalStatus::Running.priority());
        assert_eq!(
            CanonicalStatus::Running.priority(),
            CanonicalStatus::Waiting.priority()
        );
        assert_eq!(
            CanonicalStatus::Waiting.priority(),
            CanonicalStatus::Pending.priority()
        );
        assert!(CanonicalStatus::Pending.priority() > CanonicalStatus::Cancelled.priority());
        assert!(CanonicalStatus::Cancelled.priority() > CanonicalStatus::Success.priority());
        assert_eq!(
            CanonicalStatus::Success.priority(),
            CanonicalStatus::Skipped.priority()
        );
        assert!(CanonicalStatus::Skipped.priority() > CanonicalStatus::Unknown.priority());
    }

    #[test]
    fn test_completed_run_classified_by_conclusion() {
        assert_eq!(
            CanonicalStatus::from_run("completed", Some("success")),
            CanonicalStatus::Success
        );
        assert_eq!(
            CanonicalStatus::from_run("completed", Some("failure")),
            CanonicalStatus::Failure
        );
        assert_eq!(
            CanonicalStatus::from_run("completed", Some("skipped")),
            CanonicalStatus::Skipped
        );
    }

    #[test]
    fn test_in_flight_run_classified_by_status() {
        assert_eq!(
            CanonicalStatus::from_run("running", None),
            CanonicalStatus::Running
        );
        assert_eq!(
            CanonicalStatus::from_run("waiting", Some("success")),
            CanonicalStatus::Waiting
        );
    }

    #[test]
    fn test_unrecognized_values_map_to_unknown() {
        assert_eq!(
            CanonicalStatus::from_run("completed", Some("exploded")),
            CanonicalStatus::Unknown
        );
        assert_eq!(
            CanonicalStatus::from_run("completed", None),
            CanonicalStatus::Unknown
        );
        assert_eq!(
            CanonicalStatus::from_run("queued-ish", None),
            CanonicalStatus::Unknown
        );
    }
}
