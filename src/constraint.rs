//! `Constraint`: limits the Engine honors when merging new Objects
//! (spec.md §3, §4.4). Unconstrained dimensions are unbounded.

use chrono::{DateTime, Utc};

/// Time window and result-count limits for one traversal.
///
/// All fields are optional; `None` means unbounded in that dimension.
/// `total_limit = Some(0)` is the degenerate case spec.md §8 calls out:
/// the Graph stays exactly the seed set.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    /// Inclusive time window `[start, end]` a Store should filter to,
    /// where it can push the filter down (spec.md §4.1).
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,

    /// Maximum Objects per Class across the whole Graph.
    pub per_class_limit: Option<usize>,

    /// Maximum total Objects across the whole Graph.
    pub total_limit: Option<usize>,

    /// Maximum Objects returned by a single rule-step (one Rule applied
    /// to one source Object, before merging into the Graph).
    pub per_rule_step_limit: Option<usize>,
}

impl Constraint {
    pub fn unbounded() -> Self {
        Constraint::default()
    }

    pub fn with_total_limit(mut self, limit: usize) -> Self {
        self.total_limit = Some(limit);
        self
    }

    pub fn with_per_class_limit(mut self, limit: usize) -> Self {
        self.per_class_limit = Some(limit);
        self
    }

    pub fn with_per_rule_step_limit(mut self, limit: usize) -> Self {
        self.per_rule_step_limit = Some(limit);
        self
    }

    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Whether a timestamp falls inside the configured window (always
    /// true if no window is set).
    pub fn allows_time(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if ts > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unbounded_allows_everything() {
        let c = Constraint::unbounded();
        assert!(c.allows_time(Utc.timestamp_opt(0, 0).unwrap()));
    }

    #[test]
    fn window_excludes_outside_timestamps() {
        let start = Utc.timestamp_opt(100, 0).unwrap();
        let end = Utc.timestamp_opt(200, 0).unwrap();
        let c = Constraint::default().with_window(start, end);
        assert!(!c.allows_time(Utc.timestamp_opt(50, 0).unwrap()));
        assert!(c.allows_time(Utc.timestamp_opt(150, 0).unwrap()));
        assert!(!c.allows_time(Utc.timestamp_opt(250, 0).unwrap()));
    }
}
