pub mod backup;
pub mod context;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod protocol;
