//! Trial window calculations
//!
//! Pure date math over an organization's trial window. Every function takes
//! `now` as a parameter so callers (and tests) control the clock; nothing in
//! here touches the system time or the database.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// Trial milestone buckets, used for analytics cohorts and in-app messaging.
///
/// Note the deliberate gap: progress in [10%, 25%) maps to no milestone at
/// all. Product tracks "beginning" only for the first few days and picks up
/// again at the quarter mark; filling the gap would silently change cohort
/// definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialMilestone {
    #[serde(rename = "beginning")]
    Beginning,
    #[serde(rename = "25-percent")]
    Quarter,
    #[serde(rename = "halfway")]
    Halfway,
    #[serde(rename = "75-percent")]
    ThreeQuarters,
    #[serde(rename = "ending")]
    Ending,
}

/// An organization's trial window. Either bound may be absent (orgs created
/// before trials existed, or imported tenants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialWindow {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl TrialWindow {
    pub fn new(start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        Self { start, end }
    }

    /// Whether the trial is currently active.
    ///
    /// A paid subscription always wins: once an org pays, its trial is over
    /// regardless of the dates. A missing end date means no active trial.
    pub fn is_active(&self, now: OffsetDateTime, has_paid_subscription: bool) -> bool {
        if has_paid_subscription {
            return false;
        }
        match self.end {
            Some(end) => now < end,
            None => false,
        }
    }

    /// Whole days remaining in the trial, rounded up, never negative.
    ///
    /// 2.1 days left reads as "3 days" in the UI, which is the generous
    /// direction. Returns 0 when the window is missing or already past.
    pub fn days_left(&self, now: OffsetDateTime) -> i64 {
        let end = match self.end {
            Some(end) => end,
            None => return 0,
        };
        let remaining = (end - now).whole_seconds();
        if remaining <= 0 {
            return 0;
        }
        // Ceiling division
        (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }

    /// Elapsed percentage of the trial window, clamped to [0, 100].
    ///
    /// A degenerate window (end at or before start) or a missing bound reads
    /// as fully elapsed.
    pub fn progress(&self, now: OffsetDateTime) -> f64 {
        let (start, end) = match (self.start, self.end) {
            (Some(start), Some(end)) => (start, end),
            _ => return 100.0,
        };
        let total = (end - start).whole_seconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (now - start).whole_seconds();
        let pct = (elapsed as f64 / total as f64) * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// Milestone bucket for the current progress, if any.
    pub fn milestone(&self, now: OffsetDateTime) -> Option<TrialMilestone> {
        let progress = self.progress(now);
        if progress >= 90.0 {
            Some(TrialMilestone::Ending)
        } else if progress >= 75.0 {
            Some(TrialMilestone::ThreeQuarters)
        } else if progress >= 50.0 {
            Some(TrialMilestone::Halfway)
        } else if progress >= 25.0 {
            Some(TrialMilestone::Quarter)
        } else if progress < 10.0 {
            Some(TrialMilestone::Beginning)
        } else {
            // [10%, 25%): no milestone
            None
        }
    }

    /// Snapshot of all trial figures at `now`, for API responses.
    pub fn report(&self, now: OffsetDateTime, has_paid_subscription: bool) -> TrialReport {
        TrialReport {
            active: self.is_active(now, has_paid_subscription),
            days_left: self.days_left(now),
            progress: self.progress(now),
            milestone: self.milestone(now),
        }
    }

    /// Standard 14-day window starting at `now`.
    pub fn starting_at(now: OffsetDateTime) -> Self {
        Self {
            start: Some(now),
            end: Some(now + Duration::days(14)),
        }
    }
}

/// Point-in-time trial figures, serialized for the trial status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub active: bool,
    pub days_left: i64,
    pub progress: f64,
    pub milestone: Option<TrialMilestone>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn fourteen_day_window() -> TrialWindow {
        TrialWindow::new(
            Some(datetime!(2026-03-01 00:00:00 UTC)),
            Some(datetime!(2026-03-15 00:00:00 UTC)),
        )
    }

    // =========================================================================
    // is_active
    // =========================================================================

    #[test]
    fn test_active_at_start() {
        let window = fourteen_day_window();
        assert!(window.is_active(datetime!(2026-03-01 00:00:00 UTC), false));
    }

    #[test]
    fn test_inactive_at_exact_end() {
        let window = fourteen_day_window();
        // now == end is no longer active
        assert!(!window.is_active(datetime!(2026-03-15 00:00:00 UTC), false));
    }

    #[test]
    fn test_paid_subscription_ends_trial() {
        let window = fourteen_day_window();
        assert!(!window.is_active(datetime!(2026-03-05 00:00:00 UTC), true));
    }

    #[test]
    fn test_missing_end_date_is_inactive() {
        let window = TrialWindow::new(Some(datetime!(2026-03-01 00:00:00 UTC)), None);
        assert!(!window.is_active(datetime!(2026-03-05 00:00:00 UTC), false));
    }

    // =========================================================================
    // days_left
    // =========================================================================

    #[test]
    fn test_days_left_full_window() {
        let window = fourteen_day_window();
        assert_eq!(window.days_left(datetime!(2026-03-01 00:00:00 UTC)), 14);
    }

    #[test]
    fn test_days_left_rounds_up() {
        let window = fourteen_day_window();
        // 2.5 days remaining reads as 3
        assert_eq!(window.days_left(datetime!(2026-03-12 12:00:00 UTC)), 3);
    }

    #[test]
    fn test_days_left_partial_day_rounds_up() {
        let window = fourteen_day_window();
        // One second remaining still counts as a day
        assert_eq!(window.days_left(datetime!(2026-03-14 23:59:59 UTC)), 1);
    }

    #[test]
    fn test_days_left_never_negative() {
        let window = fourteen_day_window();
        assert_eq!(window.days_left(datetime!(2026-04-01 00:00:00 UTC)), 0);
    }

    #[test]
    fn test_days_left_missing_dates() {
        let window = TrialWindow::new(None, None);
        assert_eq!(window.days_left(datetime!(2026-03-05 00:00:00 UTC)), 0);
    }

    // =========================================================================
    // progress
    // =========================================================================

    #[test]
    fn test_progress_at_start() {
        let window = fourteen_day_window();
        assert_eq!(window.progress(datetime!(2026-03-01 00:00:00 UTC)), 0.0);
    }

    #[test]
    fn test_progress_halfway() {
        let window = fourteen_day_window();
        assert_eq!(window.progress(datetime!(2026-03-08 00:00:00 UTC)), 50.0);
    }

    #[test]
    fn test_progress_clamped_past_end() {
        let window = fourteen_day_window();
        assert_eq!(window.progress(datetime!(2026-06-01 00:00:00 UTC)), 100.0);
    }

    #[test]
    fn test_progress_clamped_before_start() {
        let window = fourteen_day_window();
        assert_eq!(window.progress(datetime!(2026-02-01 00:00:00 UTC)), 0.0);
    }

    #[test]
    fn test_progress_degenerate_window() {
        // end == start
        let ts = datetime!(2026-03-01 00:00:00 UTC);
        let window = TrialWindow::new(Some(ts), Some(ts));
        assert_eq!(window.progress(ts), 100.0);
    }

    #[test]
    fn test_progress_missing_start() {
        let window = TrialWindow::new(None, Some(datetime!(2026-03-15 00:00:00 UTC)));
        assert_eq!(window.progress(datetime!(2026-03-05 00:00:00 UTC)), 100.0);
    }

    // =========================================================================
    // milestone
    // =========================================================================

    #[test]
    fn test_milestone_beginning() {
        let window = fourteen_day_window();
        // Day 1 of 14 is ~7%
        assert_eq!(
            window.milestone(datetime!(2026-03-02 00:00:00 UTC)),
            Some(TrialMilestone::Beginning)
        );
    }

    #[test]
    fn test_milestone_gap_between_10_and_25_percent() {
        let window = fourteen_day_window();
        // Day 2 of 14 is ~14%, inside the documented gap
        assert_eq!(window.milestone(datetime!(2026-03-03 00:00:00 UTC)), None);
    }

    #[test]
    fn test_milestone_quarter() {
        let window = fourteen_day_window();
        // Day 4 of 14 is ~29%
        assert_eq!(
            window.milestone(datetime!(2026-03-05 00:00:00 UTC)),
            Some(TrialMilestone::Quarter)
        );
    }

    #[test]
    fn test_milestone_halfway() {
        let window = fourteen_day_window();
        assert_eq!(
            window.milestone(datetime!(2026-03-08 00:00:00 UTC)),
            Some(TrialMilestone::Halfway)
        );
    }

    #[test]
    fn test_milestone_three_quarters() {
        let window = fourteen_day_window();
        // Day 11 of 14 is ~79%
        assert_eq!(
            window.milestone(datetime!(2026-03-12 00:00:00 UTC)),
            Some(TrialMilestone::ThreeQuarters)
        );
    }

    #[test]
    fn test_milestone_ending() {
        let window = fourteen_day_window();
        // Day 13 of 14 is ~93%
        assert_eq!(
            window.milestone(datetime!(2026-03-14 00:00:00 UTC)),
            Some(TrialMilestone::Ending)
        );
    }

    #[test]
    fn test_milestone_serialization_names() {
        let json = serde_json::to_string(&TrialMilestone::Quarter).unwrap();
        assert_eq!(json, "\"25-percent\"");
        let json = serde_json::to_string(&TrialMilestone::ThreeQuarters).unwrap();
        assert_eq!(json, "\"75-percent\"");
    }

    // =========================================================================
    // Full scenarios with a fixed clock
    // =========================================================================

    #[test]
    fn test_scenario_fresh_trial() {
        let t0 = datetime!(2026-03-01 09:00:00 UTC);
        let window = TrialWindow::starting_at(t0);
        let report = window.report(t0, false);

        assert!(report.active);
        assert_eq!(report.days_left, 14);
        assert!(report.progress < 1.0);
        assert_eq!(report.milestone, Some(TrialMilestone::Beginning));
    }

    #[test]
    fn test_scenario_one_week_in() {
        let t0 = datetime!(2026-03-01 09:00:00 UTC);
        let window = TrialWindow::starting_at(t0);
        let now = t0 + Duration::days(7);
        let report = window.report(now, false);

        assert!(report.active);
        assert_eq!(report.days_left, 7);
        assert_eq!(report.progress, 50.0);
        assert_eq!(report.milestone, Some(TrialMilestone::Halfway));
    }

    #[test]
    fn test_scenario_expired_trial() {
        let t0 = datetime!(2026-03-01 09:00:00 UTC);
        let window = TrialWindow::starting_at(t0);
        let now = t0 + Duration::days(20);
        let report = window.report(now, false);

        assert!(!report.active);
        assert_eq!(report.days_left, 0);
        assert_eq!(report.progress, 100.0);
        assert_eq!(report.milestone, Some(TrialMilestone::Ending));
    }
}
