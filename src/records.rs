use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A graded piece of work. `total_marks` is the maximum the grader could
/// award; records with no marks on offer are skipped during extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    pub marks_obtained: f64,
    pub total_marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: u64,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub assignment_id: u64,
    pub submitted_at: DateTime<Utc>,
}

/// One student's academic history within one classroom, as supplied by the
/// host application. The engine only reads these collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentClasswork {
    pub grades: Vec<GradeRecord>,
    pub submissions: Vec<SubmissionRecord>,
    pub assignments: Vec<AssignmentRecord>,
}
