//! Domain 模块
//!
//! 币种描述、地址/密钥模型、HD 派生、钱包数据与余额计算

pub mod address;
pub mod balance;
pub mod coin;
pub mod derivation;
pub mod key_format;
pub mod wallet_data;

// 重新导出常用类型
pub use address::{Address, AddressCase, AddressFormat, PrivateKey, PublicKey};
pub use balance::{AddressBalance, BalanceCalculator, TransactionBalance, UnspentOutput, WdBalance};
pub use coin::{BalanceScheme, Coin, CoinDescriptor, FeeDefaults, FeeTiers, TransactionScheme};
pub use derivation::{DerivationType, HdNodeCache, HdPath, HdSession, Seed};
pub use key_format::{KeyFormat, UtxoNetworkParams};
pub use wallet_data::{
    AccountTransfer, ScriptType, TransactionDetail, UtxoInput, UtxoOutput, WalletAddress,
    WalletData, WalletDataPatch, WalletTransaction,
};
