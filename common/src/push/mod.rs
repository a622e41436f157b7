// Push delivery module

pub mod fcm;

pub use fcm::{FcmPushSender, PushSender};
