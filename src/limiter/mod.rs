//! Rate limiting algorithms and their shared contract.

mod limit;
mod redis_token_bucket;
mod sliding_window;
mod strategy;
mod token_bucket;

pub use limit::{Decision, Limit};
pub use redis_token_bucket::RedisTokenBucket;
pub use sliding_window::SlidingWindow;
pub use strategy::Strategy;
pub use token_bucket::TokenBucket;
