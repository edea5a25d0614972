pub mod database;
pub mod files;
pub mod statements;
pub mod urls;
