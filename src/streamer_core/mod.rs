//! Upstream trade feed: Yellowstone subscription, balance-delta decoding
//! and the reconnecting connection manager.

pub mod balance_extractor;
pub mod config;
pub mod connection;
pub mod error_handler;
pub mod grpc_client;
pub mod trade_detector;

pub use config::RuntimeConfig;
pub use connection::{StreamConnectionManager, TradeStreamSource};
pub use error_handler::StreamError;
pub use grpc_client::YellowstoneTradeSource;
