pub mod content;
pub mod error;
pub mod files;
pub mod manifest;
pub mod options;
pub mod parts;
pub mod steps;
pub mod strategy;

pub mod core {
    pub mod utils;
    pub mod value;
}

pub mod records {
    pub mod row;
}
