//! Messaging channels that bridge chat apps to the gateway.

pub mod telegram;

pub use telegram::{run_telegram, TelegramBridge};
