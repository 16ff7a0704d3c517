//! 网络边界
//!
//! 具体的浏览器/节点客户端在本 crate 之外实现；超时、限流和重连也由实现方负责。
//! 方案专属方法默认返回 `UnsupportedScheme`。

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    domain::wallet_data::WalletTransaction,
    error::{Result, WalletError},
};

/// 网络给出的每字节费率 (satoshi/byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

/// gas 估算请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimateRequest {
    pub from: Option<String>,
    pub to: String,
    pub value: Decimal,
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// 单个地址的全部历史
    async fn get_address_txs(&self, address: &str) -> Result<Vec<WalletTransaction>>;

    /// 批量查询；默认逐个查询
    async fn get_bulk_addr_txs(&self, addresses: &[String]) -> Result<Vec<WalletTransaction>> {
        let mut all = Vec::new();
        for address in addresses {
            all.extend(self.get_address_txs(address).await?);
        }
        Ok(all)
    }

    async fn get_tx(&self, txid: &str) -> Result<Option<WalletTransaction>>;

    /// 广播已签名的原始交易，返回网络确认的 txid
    async fn broadcast_transaction(&self, raw_hex: &str) -> Result<String>;

    async fn get_fee_record(&self) -> Result<FeeRates> {
        Err(WalletError::UnsupportedScheme(
            "fee record is only available on utxo networks".into(),
        ))
    }

    /// 以币为单位
    async fn get_gas_price(&self) -> Result<Decimal> {
        Err(WalletError::UnsupportedScheme(
            "gas price is only available on account networks".into(),
        ))
    }

    async fn estimate_gas(&self, _request: &GasEstimateRequest) -> Result<u64> {
        Err(WalletError::UnsupportedScheme(
            "gas estimation is only available on account networks".into(),
        ))
    }
}

/// 网络事件源，订阅以通道形式返回；发送端关闭即订阅结束
pub trait NetworkEvents: Send + Sync {
    /// 新区块高度
    fn on_block(&self) -> broadcast::Receiver<u64>;

    /// 给定地址上出现的新交易
    fn on_address_activity(&self, addresses: &[String]) -> mpsc::Receiver<WalletTransaction>;

    /// 交易确认（一次性）
    fn on_tx_confirm(&self, txid: &str) -> oneshot::Receiver<WalletTransaction>;
}
