pub mod classifier;
pub mod database;
pub mod store;
