//! Transports feeding Telegram updates into the SiteBot pipeline.
//!
//! Both the axum webhook [`server`] and the long-poll [`Poller`] hand each
//! update to the same [`Dispatcher`].

pub mod dispatch;
pub mod poller;
pub mod server;

pub use dispatch::Dispatcher;
pub use poller::Poller;
pub use server::{router, serve};
