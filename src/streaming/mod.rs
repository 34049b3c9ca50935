pub mod data_feed;

pub use data_feed::{JsonFileFeed, MarketDataProvider, SnapshotDocument, StaticFeed};
