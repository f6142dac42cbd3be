//! Venue API clients

pub mod hyperliquid;

pub use hyperliquid::HyperliquidClient;
