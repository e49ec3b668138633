pub mod db;
pub mod error;
pub mod linking;
mod migrations;
pub mod state;
pub mod types;
