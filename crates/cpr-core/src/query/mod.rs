pub mod guards;
pub mod parse_repo;
pub mod resources;
