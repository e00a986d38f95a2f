pub mod client;
pub mod feed;

pub use client::MarketClient;
pub use feed::FeedSource;
