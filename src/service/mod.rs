pub mod account_transaction;
pub mod coin_select; // 纯函数选币
pub mod fee_provider;
pub mod network; // 网络边界 trait
pub mod private_provider;
pub mod utxo_transaction;
pub mod wallet_data_provider;
pub mod wallet_generator; // 地址发现
pub mod wallet_service;
pub mod wallet_sync;

pub use coin_select::{AccumulativeSelector, CoinSelector, Selection, SelectionInput, SelectionTarget};
pub use fee_provider::{
    AccountFeeProvider, FeeOptions, FeeProvider, FeeRecord, FeeRecordCache, FeeTier,
    UtxoFeeProvider,
};
pub use network::{FeeRates, GasEstimateRequest, NetworkClient, NetworkEvents};
pub use private_provider::{PrivateProvider, SignedPayload, SignedTransaction};
pub use wallet_data_provider::{AddressProvider, TransactionProvider, WdProvider};
pub use wallet_generator::{DiscoveryReport, WalletGenerator};
pub use wallet_service::{Wallet, WalletBuilder};
pub use wallet_sync::{UpdateReport, WalletSync, WatchReport};
