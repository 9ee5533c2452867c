pub mod db;
pub mod migrations;

pub use db::{Batch, Database};
