pub mod minswap;
pub mod provider;
pub mod taptools;

pub use minswap::MinswapClient;
pub use provider::{MarketDataProvider, TokenListProvider};
pub use taptools::TapToolsClient;
