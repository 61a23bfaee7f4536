use serde::{Deserialize, Serialize};

/// A student on the roster. The identifier doubles as the student's login
/// account on the external certification portal. `grade` 0 marks a
/// graduated student; graduated students keep their cached records but are
/// excluded from reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub grade: i64,
    pub class_no: i64,
    pub student_no: i64,
    pub name: String,
}

impl Student {
    /// Whether the student is still enrolled.
    pub fn is_active(&self) -> bool {
        self.grade != 0
    }
}
