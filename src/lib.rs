pub mod amount;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod filter;
pub mod gateway;
pub mod monitor;
pub mod reporter;
pub mod state;
pub mod types;

/// Ethereum mainnet public JSON-RPC endpoint (rate limited, no key required)
pub const ETH_RPC_URL: &str = "https://ethereum-rpc.publicnode.com";

/// BNB Smart Chain public JSON-RPC endpoint
pub const BSC_RPC_URL: &str = "https://bsc-dataseed.binance.org/";

/// Base mainnet public JSON-RPC endpoint
pub const BASE_RPC_URL: &str = "https://base-rpc.publicnode.com";

/// Environment variable consulted for the RPC URL when the CLI flag is absent.
pub const RPC_URL_ENV: &str = "RPC_URL";
