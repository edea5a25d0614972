pub mod error;
pub mod progress;
pub mod session;
pub mod split;
pub mod state;
pub mod workspace;
