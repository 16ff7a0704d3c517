//! 增量更新
//!
//! 地址列表按固定大小分块，最多 K 个分块并发查询；单个分块失败只记日志并跳过。

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};

use super::{
    network::{NetworkClient, NetworkEvents},
    wallet_data_provider::WdProvider,
};
use crate::{
    config::SyncConfig,
    domain::wallet_data::WalletTransaction,
    error::{Result, WalletError},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub chunks: usize,
    pub failed_chunks: usize,
    /// 合并的交易条数（含已存在的 txid）
    pub transactions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub blocks: usize,
    pub activity: usize,
}

async fn next_block(
    rx: &mut Option<broadcast::Receiver<u64>>,
) -> Option<std::result::Result<u64, RecvError>> {
    match rx {
        Some(rx) => Some(rx.recv().await),
        None => None,
    }
}

async fn next_activity(
    rx: &mut Option<mpsc::Receiver<WalletTransaction>>,
) -> Option<WalletTransaction> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

pub struct WalletSync {
    wd: Arc<WdProvider>,
    network: Arc<dyn NetworkClient>,
    config: SyncConfig,
}

impl WalletSync {
    pub fn new(wd: Arc<WdProvider>, network: Arc<dyn NetworkClient>, config: SyncConfig) -> Self {
        Self {
            wd,
            network,
            config,
        }
    }

    #[tracing::instrument(skip(self), fields(coin = %self.wd.coin()))]
    pub async fn update(&self) -> UpdateReport {
        let addresses: Vec<String> = self
            .wd
            .address()
            .list(None)
            .into_iter()
            .map(|a| a.address)
            .collect();
        let chunks: Vec<Vec<String>> = addresses
            .chunks(self.config.chunk_size.max(1))
            .map(<[String]>::to_vec)
            .collect();

        let mut report = UpdateReport {
            chunks: chunks.len(),
            ..UpdateReport::default()
        };

        let network = &self.network;
        let mut results = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk, addresses)| async move {
                (chunk, network.get_bulk_addr_txs(&addresses).await)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((chunk, result)) = results.next().await {
            let merged = result.and_then(|txs| self.wd.transaction().add_many(txs));
            match merged {
                Ok(count) => report.transactions += count,
                Err(e) => {
                    tracing::warn!(chunk, error = %e, "chunk update failed, skipping");
                    report.failed_chunks += 1;
                }
            }
        }

        tracing::debug!(
            chunks = report.chunks,
            failed = report.failed_chunks,
            transactions = report.transactions,
            "update finished"
        );
        report
    }

    /// 重新查询所有未确认交易，返回更新的条数
    pub async fn refresh_unconfirmed(&self) -> usize {
        let mut refreshed = Vec::new();
        for tx in self.wd.transaction().unconfirmed() {
            match self.network.get_tx(&tx.txid).await {
                Ok(Some(latest)) => refreshed.push(latest),
                Ok(None) => tracing::debug!(txid = %tx.txid, "transaction not found on network"),
                Err(e) => tracing::warn!(txid = %tx.txid, error = %e, "refresh failed"),
            }
        }

        let count = refreshed.len();
        if let Err(e) = self.wd.transaction().add_many(refreshed) {
            tracing::warn!(error = %e, "refreshed transactions rejected");
            return 0;
        }
        count
    }

    /// 新区块触发整体更新，地址活动直接合并；两个订阅都关闭后返回
    pub async fn watch(&self, events: &dyn NetworkEvents) -> WatchReport {
        let addresses: Vec<String> = self
            .wd
            .address()
            .list(None)
            .into_iter()
            .map(|a| a.address)
            .collect();
        let mut blocks = Some(events.on_block());
        let mut activity = Some(events.on_address_activity(&addresses));
        let mut report = WatchReport::default();

        loop {
            tokio::select! {
                block = next_block(&mut blocks), if blocks.is_some() => {
                    match block {
                        Some(Ok(height)) => {
                            tracing::debug!(height, "new block");
                            report.blocks += 1;
                            self.update().await;
                        }
                        Some(Err(RecvError::Lagged(skipped))) => {
                            tracing::warn!(skipped, "block subscription lagged");
                            report.blocks += 1;
                            self.update().await;
                        }
                        Some(Err(RecvError::Closed)) | None => blocks = None,
                    }
                }
                tx = next_activity(&mut activity), if activity.is_some() => {
                    match tx {
                        Some(tx) => {
                            report.activity += 1;
                            if let Err(e) = self.wd.transaction().add(tx) {
                                tracing::warn!(error = %e, "address activity rejected");
                            }
                        }
                        None => activity = None,
                    }
                }
                else => break,
            }
        }

        report
    }

    /// 等待一笔交易确认并合并
    pub async fn wait_for_confirmation(
        &self,
        events: &dyn NetworkEvents,
        txid: &str,
    ) -> Result<WalletTransaction> {
        let tx = events
            .on_tx_confirm(txid)
            .await
            .map_err(|_| {
                WalletError::network(format!("confirmation subscription for {} closed", txid))
            })?;
        self.wd.transaction().add(tx.clone())?;
        tracing::info!(txid, height = ?tx.block_height, "transaction confirmed");
        Ok(tx)
    }
}
