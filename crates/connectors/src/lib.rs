pub mod adapter;
pub mod archive;
pub mod error;
pub mod sql;
