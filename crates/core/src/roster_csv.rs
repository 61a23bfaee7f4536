//! Roster CSV reader — imports a student roster file.
//!
//! Expected header row: `student_id,grade,class_no,student_no,name`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, StandingsError};
use crate::models::student::Student;

#[derive(Debug, Deserialize)]
struct StudentCsvRow {
    student_id: String,
    grade: i64,
    class_no: i64,
    student_no: i64,
    name: String,
}

impl StudentCsvRow {
    fn to_model(self) -> Result<Student> {
        if self.student_id.is_empty() {
            return Err(StandingsError::Serialization(
                "roster row with empty student_id".into(),
            ));
        }
        if self.grade < 0 || self.class_no < 1 || self.student_no < 1 {
            return Err(StandingsError::Serialization(format!(
                "roster row for {} has an invalid position",
                self.student_id
            )));
        }
        Ok(Student {
            student_id: self.student_id,
            grade: self.grade,
            class_no: self.class_no,
            student_no: self.student_no,
            name: self.name,
        })
    }
}

/// Read a student roster from a CSV file.
pub fn read_roster_csv(path: &Path) -> Result<Vec<Student>> {
    let mut rdr =
        csv::Reader::from_path(path).map_err(|e| StandingsError::Io(std::io::Error::other(e)))?;

    let mut students = Vec::new();
    for result in rdr.deserialize() {
        let row: StudentCsvRow = result.map_err(|e| {
            StandingsError::Serialization(format!("CSV parse error in {}: {e}", path.display()))
        })?;
        students.push(row.to_model()?);
    }

    Ok(students)
}
