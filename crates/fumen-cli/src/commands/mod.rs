pub mod config;
pub mod index;
pub mod status;

pub use index::run_index;
pub use status::show_status;
