pub mod cache;
pub mod layout;
pub mod runs;
