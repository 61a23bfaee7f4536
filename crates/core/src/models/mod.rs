pub mod reconciliation;
pub mod standing;
pub mod student;
