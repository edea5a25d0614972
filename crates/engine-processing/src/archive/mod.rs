pub mod archiver;
pub mod batch_size;
