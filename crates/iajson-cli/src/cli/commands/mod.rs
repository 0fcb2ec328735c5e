pub mod auth_url;
pub mod call;
pub mod discover;
pub mod register;
pub mod sign;

mod dispatch;
pub use dispatch::dispatch;
