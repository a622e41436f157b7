// Database layer module

pub mod pool;
pub mod redis;
pub mod repositories;

pub use pool::DbPool;
pub use redis::RedisPool;
pub use repositories::{NotificationRepository, NotificationStore};
