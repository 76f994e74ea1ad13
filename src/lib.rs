use mongodb::Database;
use std::sync::OnceLock;

pub mod apex;
pub mod auth;
pub mod config;
pub mod products;
pub mod recommendations;
pub mod tracker;

pub static DB: OnceLock<Database> = OnceLock::new();
