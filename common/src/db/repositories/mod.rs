// Repository layer for database operations

pub mod notification;

pub use notification::{NotificationRepository, NotificationStore};
