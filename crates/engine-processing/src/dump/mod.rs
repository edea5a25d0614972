pub mod dumper;
pub mod planner;
pub mod statement;
pub mod writer;
