//! Option chain data: core types, brokerage JSON parsing, snapshot providers.

pub mod chain_json;
pub mod provider;
pub mod types;

pub use chain_json::{parse_chain, raw_to_snapshot, ChainParseError, RawChainResponse, RawContract};
pub use provider::{
    fetch_with_retry, DirectorySnapshotProvider, FetchError, SnapshotProvider, StaticSnapshotProvider,
};
pub use types::{OptionQuote, OptionType, OptionsChain, OptionsSnapshot};
