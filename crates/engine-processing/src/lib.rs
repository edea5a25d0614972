pub mod archive;
pub mod dump;
pub mod error;
pub mod import;
pub mod scan;
