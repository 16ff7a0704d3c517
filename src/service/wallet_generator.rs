//! 地址发现
//!
//! RECEIVE 与 CHANGE 各自独立、并发扫描：派生一批地址，批量拉取历史并合并，
//! 统计批内仍然纯净的地址；不足最小数量就再派生一批。网络失败直接终止发现。

use std::sync::Arc;

use serde::Serialize;

use super::{network::NetworkClient, private_provider::PrivateProvider, wallet_data_provider::WdProvider};
use crate::{
    config::DiscoveryConfig,
    domain::{coin::BalanceScheme, derivation::DerivationType, wallet_data::WalletAddress},
    error::{Result, WalletError},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub receive: usize,
    pub change: usize,
    pub transactions: usize,
}

pub struct WalletGenerator {
    wd: Arc<WdProvider>,
    signer: Arc<dyn PrivateProvider>,
    network: Arc<dyn NetworkClient>,
    config: DiscoveryConfig,
}

impl WalletGenerator {
    pub fn new(
        wd: Arc<WdProvider>,
        signer: Arc<dyn PrivateProvider>,
        network: Arc<dyn NetworkClient>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            wd,
            signer,
            network,
            config,
        }
    }

    #[tracing::instrument(skip(self), fields(coin = %self.wd.coin()))]
    pub async fn generate(&self) -> Result<DiscoveryReport> {
        if self.config.batch_size == 0 || self.config.batch_size < self.config.min_address_count {
            return Err(WalletError::Config(format!(
                "discovery batch size {} must be at least the minimum pure address count {}",
                self.config.batch_size, self.config.min_address_count
            )));
        }

        let report = match self.wd.coin().balance_scheme() {
            BalanceScheme::Account => {
                let address = self.signer.new_address(DerivationType::Receive)?;
                let txs = self.network.get_address_txs(&address.address).await?;
                self.wd.transaction().add_many(txs)?;
                DiscoveryReport {
                    receive: 1,
                    change: 0,
                    transactions: self.wd.data().transactions.len(),
                }
            }
            BalanceScheme::Utxo => {
                let (receive, change) = tokio::try_join!(
                    self.scan(DerivationType::Receive),
                    self.scan(DerivationType::Change)
                )?;
                DiscoveryReport {
                    receive,
                    change,
                    transactions: self.wd.data().transactions.len(),
                }
            }
        };

        tracing::info!(
            receive = report.receive,
            change = report.change,
            transactions = report.transactions,
            "discovery finished"
        );
        Ok(report)
    }

    /// 返回该类型最终跟踪的地址数
    async fn scan(&self, derivation_type: DerivationType) -> Result<usize> {
        let min = self.config.min_address_count as usize;
        loop {
            let batch = self.derive_batch(derivation_type).await?;
            let addresses: Vec<String> = batch.iter().map(|a| a.address.clone()).collect();

            let txs = self.network.get_bulk_addr_txs(&addresses).await?;
            let fetched = txs.len();
            self.wd.transaction().add_many(txs)?;

            let balance = self.wd.balance();
            let pure = addresses.iter().filter(|a| balance.is_pure(a)).count();
            tracing::debug!(%derivation_type, batch = addresses.len(), fetched, pure, "batch scanned");

            if pure >= min {
                return Ok(self.wd.address().count(Some(derivation_type)));
            }
        }
    }

    /// 逐个派生，相邻两次派生之间至少间隔 derive_delay
    async fn derive_batch(&self, derivation_type: DerivationType) -> Result<Vec<WalletAddress>> {
        let delay = self.config.derive_delay();
        let mut batch = Vec::with_capacity(self.config.batch_size as usize);
        for i in 0..self.config.batch_size {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            batch.push(self.signer.new_address(derivation_type)?);
        }
        Ok(batch)
    }
}
