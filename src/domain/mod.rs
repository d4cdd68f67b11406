pub mod message;
pub mod rating;
pub mod retention;
pub mod sampling;
