pub mod clicks;
pub mod deals;
pub mod migrations;
pub mod retention;
pub mod sqlite;
pub mod stats;
pub mod users;

pub use sqlite::Db;
