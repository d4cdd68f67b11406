pub mod message;

pub use message::{FeedItemRecord, MessageRecord, VoteRecord};
