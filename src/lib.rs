//! walletcore - 多币种钱包核心
//!
//! 一个种子派生确定性地址，从原始交易历史重建余额，选币并构造签名交易；
//! UTXO（比特币系）与账户（以太坊系）两种账本模型使用同一套接口。
//! 网络访问、持久化由调用方通过 `NetworkClient` / `WalletData` 负责。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{Result, WalletError};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            Address, AddressFormat, BalanceScheme, Coin, DerivationType, Seed, WalletAddress,
            WalletData, WalletTransaction, WdBalance,
        },
        error::{Result, WalletError},
        service::{
            FeeOptions, FeeTier, NetworkClient, NetworkEvents, SignedTransaction, Wallet,
            WalletBuilder,
        },
    };
}
