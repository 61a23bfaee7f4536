//! Standings Core — portal sync state, academic records, configuration, and
//! the database layer.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod roster_csv;
