pub mod models;
pub mod notebooks;

pub use models::{Context, Resource};
