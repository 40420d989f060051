//! Feed subscriber for the credchain projector.
//!
//! Connects to the ledger's event feed over TCP, replays from the most
//! recent known blocks, and hands batches to the projection pipeline one at
//! a time.

pub mod config;
pub mod error;
pub mod feed;
pub mod subscriber;

pub use config::Config;
pub use error::{Result, SubscriberError};
pub use feed::{EventFeed, SubscribeRequest, TcpEventFeed};
pub use subscriber::{KNOWN_BLOCK_COUNT, Subscriber, run_with_reconnect};
