// Database module
// This module handles SQLite storage, change tracking and live queries

pub mod connection;
pub mod live;
pub mod migrations;
pub mod models;
pub mod operations;
pub mod queries;

pub use connection::{DatabaseConnection, Table};
pub use live::LiveQuery;
