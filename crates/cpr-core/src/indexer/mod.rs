pub mod catalog;
pub mod filesystem;
pub mod pipeline;
