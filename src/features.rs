use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{StudentClasswork, SubmissionRecord};

/// Feature column order shared by training and inference.
pub const FEATURE_NAMES: [&str; 6] = [
    "avg_score",
    "submission_rate",
    "on_time_rate",
    "participation",
    "assignment_count",
    "days_since_last",
];

/// The six engagement features derived from a student's classroom history.
///
/// One type serves both the synthetic training path and live extraction, so
/// the two cannot drift apart. Percentage fields are clamped to [0, 100];
/// `days_since_last` is capped at 30 and defaults to 30 when the student has
/// never submitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub avg_score: f64,
    pub submission_rate: f64,
    pub on_time_rate: f64,
    pub participation: f64,
    pub assignment_count: u32,
    pub days_since_last: f64,
}

impl FeatureVector {
    /// Model input row, in `FEATURE_NAMES` order.
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.avg_score,
            self.submission_rate,
            self.on_time_rate,
            self.participation,
            f64::from(self.assignment_count),
            self.days_since_last,
        ]
    }
}

impl StudentClasswork {
    /// Extract features as of now. Serving-path entry point.
    pub fn features(&self) -> FeatureVector {
        self.features_at(Utc::now())
    }

    /// Extract features relative to an explicit instant. Pure: reads the
    /// record collections, mutates nothing.
    pub fn features_at(&self, now: DateTime<Utc>) -> FeatureVector {
        let scores: Vec<f64> = self
            .grades
            .iter()
            .filter(|g| g.total_marks > 0.0)
            .map(|g| g.marks_obtained / g.total_marks * 100.0)
            .collect();
        let avg_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
        .clamp(0.0, 100.0);

        let total_assignments = self.assignments.len();
        let submitted = self.submissions.len();
        let submission_rate = if total_assignments > 0 {
            (submitted as f64 / total_assignments as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let on_time = self.submissions.iter().filter(|s| self.is_on_time(s)).count();
        let on_time_rate = if submitted > 0 {
            (on_time as f64 / submitted as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let participation = (submission_rate + 0.5 * on_time_rate).min(100.0);

        let days_since_last = match self.submissions.iter().map(|s| s.submitted_at).max() {
            Some(latest) => ((now - latest).num_days() as f64).clamp(0.0, 30.0),
            None => 30.0, // never submitted
        };

        FeatureVector {
            avg_score,
            submission_rate,
            on_time_rate,
            participation,
            assignment_count: total_assignments as u32,
            days_since_last,
        }
    }

    fn is_on_time(&self, submission: &SubmissionRecord) -> bool {
        // A submission against an unknown or deadline-less assignment counts
        // as late.
        self.assignments
            .iter()
            .find(|a| a.id == submission.assignment_id)
            .and_then(|a| a.deadline)
            .map(|deadline| submission.submitted_at <= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AssignmentRecord, GradeRecord};
    use chrono::Duration;

    fn assignment(id: u64, deadline: Option<DateTime<Utc>>) -> AssignmentRecord {
        AssignmentRecord { id, deadline }
    }

    fn submission(assignment_id: u64, submitted_at: DateTime<Utc>) -> SubmissionRecord {
        SubmissionRecord {
            assignment_id,
            submitted_at,
        }
    }

    #[test]
    fn empty_history_defaults() {
        let work = StudentClasswork::default();
        let features = work.features_at(Utc::now());

        assert_eq!(features.avg_score, 0.0);
        assert_eq!(features.submission_rate, 0.0);
        assert_eq!(features.on_time_rate, 0.0);
        assert_eq!(features.participation, 0.0);
        assert_eq!(features.assignment_count, 0);
        assert_eq!(features.days_since_last, 30.0);
    }

    #[test]
    fn no_submissions_yields_zero_on_time_rate() {
        let now = Utc::now();
        let work = StudentClasswork {
            grades: vec![],
            submissions: vec![],
            assignments: vec![assignment(1, Some(now)), assignment(2, Some(now))],
        };
        let features = work.features_at(now);

        assert_eq!(features.submission_rate, 0.0);
        assert_eq!(features.on_time_rate, 0.0);
        assert_eq!(features.days_since_last, 30.0);
        assert_eq!(features.assignment_count, 2);
    }

    #[test]
    fn ungradeable_records_are_skipped() {
        let work = StudentClasswork {
            grades: vec![
                GradeRecord {
                    marks_obtained: 8.0,
                    total_marks: 10.0,
                },
                GradeRecord {
                    marks_obtained: 5.0,
                    total_marks: 0.0,
                },
            ],
            submissions: vec![],
            assignments: vec![],
        };
        let features = work.features_at(Utc::now());

        assert!((features.avg_score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn future_submission_clamps_to_zero_days() {
        let now = Utc::now();
        let work = StudentClasswork {
            grades: vec![],
            submissions: vec![submission(1, now + Duration::days(3))],
            assignments: vec![assignment(1, None)],
        };
        let features = work.features_at(now);

        assert_eq!(features.days_since_last, 0.0);
    }

    #[test]
    fn stale_submission_caps_at_thirty_days() {
        let now = Utc::now();
        let work = StudentClasswork {
            grades: vec![],
            submissions: vec![submission(1, now - Duration::days(90))],
            assignments: vec![assignment(1, None)],
        };
        let features = work.features_at(now);

        assert_eq!(features.days_since_last, 30.0);
    }

    #[test]
    fn unknown_assignment_counts_as_late() {
        let now = Utc::now();
        let work = StudentClasswork {
            grades: vec![],
            submissions: vec![submission(99, now - Duration::days(1))],
            assignments: vec![assignment(1, Some(now))],
        };
        let features = work.features_at(now);

        assert_eq!(features.on_time_rate, 0.0);
        // Still counts toward the submission rate.
        assert!((features.submission_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn typical_student_scenario() {
        // 10 graded records averaging 55%, 6 of 10 assignments submitted all
        // on time, last submission 10 days ago.
        let now = Utc::now();
        let grades: Vec<GradeRecord> = (0..10)
            .map(|_| GradeRecord {
                marks_obtained: 55.0,
                total_marks: 100.0,
            })
            .collect();

        let mut assignments = Vec::new();
        let mut submissions = Vec::new();
        for id in 1..=6u64 {
            let submitted_at = now - Duration::days(10 + (6 - id as i64));
            assignments.push(assignment(id, Some(submitted_at + Duration::hours(1))));
            submissions.push(submission(id, submitted_at));
        }
        for id in 7..=10u64 {
            assignments.push(assignment(id, Some(now - Duration::days(2))));
        }

        let work = StudentClasswork {
            grades,
            submissions,
            assignments,
        };
        let features = work.features_at(now);

        assert!((features.avg_score - 55.0).abs() < 1e-9);
        assert!((features.submission_rate - 60.0).abs() < 1e-9);
        assert!((features.on_time_rate - 100.0).abs() < 1e-9);
        assert!((features.participation - 100.0).abs() < 1e-9);
        assert_eq!(features.days_since_last, 10.0);
        assert_eq!(features.assignment_count, 10);
    }
}
