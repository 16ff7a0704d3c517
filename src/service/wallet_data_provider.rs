//! 钱包数据提供者
//!
//! `WdProvider` 持有当前版本的 `WalletData`，每次 `set_data` 写时复制、整体替换，
//! 读者总是看到完整的旧版本或新版本。监听器只拿到不可变快照。

use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use super::private_provider::PrivateProvider;
use crate::{
    domain::{
        balance::{BalanceCalculator, WdBalance},
        coin::{BalanceScheme, Coin},
        derivation::DerivationType,
        wallet_data::{WalletAddress, WalletData, WalletDataPatch, WalletTransaction},
    },
    error::{Result, WalletError},
};

/// 变更监听器：(新版本, 旧版本)
pub type ChangeListener = Box<dyn Fn(&WalletData, &WalletData) + Send + Sync>;

pub struct WdProvider {
    state: watch::Sender<Arc<WalletData>>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl WdProvider {
    pub fn new(data: WalletData) -> Self {
        let (state, _) = watch::channel(Arc::new(data));
        Self {
            state,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn empty(coin: Coin, account: u32) -> Self {
        Self::new(WalletData::new(coin, account))
    }

    /// 当前版本快照
    pub fn data(&self) -> Arc<WalletData> {
        self.state.borrow().clone()
    }

    pub fn coin(&self) -> Coin {
        self.state.borrow().coin
    }

    pub fn account(&self) -> u32 {
        self.state.borrow().account
    }

    /// 合并补丁并原子替换版本，随后同步通知监听器
    pub fn set_data(&self, patch: &WalletDataPatch) -> Arc<WalletData> {
        if patch.is_empty() {
            return self.data();
        }

        let mut replaced: Option<(Arc<WalletData>, Arc<WalletData>)> = None;
        self.state.send_modify(|current| {
            let next = Arc::new(current.apply(patch));
            let old = std::mem::replace(current, next.clone());
            replaced = Some((next, old));
        });

        let Some((new, old)) = replaced else {
            return self.data();
        };

        tracing::debug!(
            coin = %new.coin,
            addresses = new.addresses.len(),
            transactions = new.transactions.len(),
            "wallet data replaced"
        );

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener(&new, &old);
        }

        new
    }

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&WalletData, &WalletData) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(listener));
    }

    /// 异步消费者订阅版本变化
    pub fn subscribe(&self) -> watch::Receiver<Arc<WalletData>> {
        self.state.subscribe()
    }

    pub fn balance(&self) -> WdBalance {
        BalanceCalculator::calculate(&self.data())
    }

    pub fn address(&self) -> AddressProvider<'_> {
        AddressProvider { wd: self }
    }

    pub fn transaction(&self) -> TransactionProvider<'_> {
        TransactionProvider { wd: self }
    }
}

/// 地址视图
pub struct AddressProvider<'a> {
    wd: &'a WdProvider,
}

impl AddressProvider<'_> {
    /// 按地址字符串幂等；返回是否新增
    pub fn add(&self, address: WalletAddress) -> bool {
        if self.wd.data().contains_address(&address.address) {
            return false;
        }
        let next = self.wd.set_data(&WalletDataPatch::addresses(vec![address.clone()]));
        next.contains_address(&address.address)
    }

    /// 账户币种始终返回唯一地址，忽略类型过滤
    pub fn list(&self, derivation_type: Option<DerivationType>) -> Vec<WalletAddress> {
        let data = self.wd.data();
        match (data.coin.balance_scheme(), derivation_type) {
            (BalanceScheme::Account, _) | (BalanceScheme::Utxo, None) => data.addresses.clone(),
            (BalanceScheme::Utxo, Some(ty)) => data
                .addresses
                .iter()
                .filter(|a| a.derivation_type == ty)
                .cloned()
                .collect(),
        }
    }

    pub fn count(&self, derivation_type: Option<DerivationType>) -> usize {
        self.list(derivation_type).len()
    }

    /// 没有任何收支的地址数量
    pub fn pure_count(&self, derivation_type: Option<DerivationType>) -> usize {
        let balance = self.wd.balance();
        self.list(derivation_type)
            .iter()
            .filter(|a| balance.is_pure(&a.address))
            .count()
    }

    pub fn next_index(&self, derivation_type: DerivationType) -> u32 {
        self.wd.data().next_index(derivation_type)
    }

    /// 找零地址：第一个纯净的 CHANGE 地址，没有则通过签名提供者派生新地址
    pub fn last_usable(&self, signer: &dyn PrivateProvider) -> Result<WalletAddress> {
        match self.wd.coin().balance_scheme() {
            BalanceScheme::Account => match self.list(None).into_iter().next() {
                Some(address) => Ok(address),
                None => signer.new_address(DerivationType::Receive),
            },
            BalanceScheme::Utxo => {
                let balance = self.wd.balance();
                match self
                    .list(Some(DerivationType::Change))
                    .into_iter()
                    .find(|a| balance.is_pure(&a.address))
                {
                    Some(address) => Ok(address),
                    None => signer.new_address(DerivationType::Change),
                }
            }
        }
    }
}

/// 交易视图
pub struct TransactionProvider<'a> {
    wd: &'a WdProvider,
}

impl TransactionProvider<'_> {
    fn check(&self, tx: &WalletTransaction) -> Result<()> {
        let coin = self.wd.coin();
        if tx.coin != coin {
            return Err(WalletError::CoinMismatch {
                txid: tx.txid.clone(),
                expected: coin.to_string(),
                found: tx.coin.to_string(),
            });
        }
        if tx.scheme() != coin.transaction_scheme() {
            return Err(WalletError::validation(format!(
                "transaction {} uses {:?}, {} expects {:?}",
                tx.txid,
                tx.scheme(),
                coin,
                coin.transaction_scheme()
            )));
        }
        Ok(())
    }

    /// 按 txid 合并
    pub fn add(&self, tx: WalletTransaction) -> Result<()> {
        self.add_many(vec![tx]).map(|_| ())
    }

    /// 整批校验后一次性合并，返回合并的交易数
    pub fn add_many(&self, txs: Vec<WalletTransaction>) -> Result<usize> {
        for tx in &txs {
            self.check(tx)?;
        }
        let count = txs.len();
        self.wd.set_data(&WalletDataPatch::transactions(txs));
        Ok(count)
    }

    pub fn get(&self, txid: &str) -> Option<WalletTransaction> {
        self.wd.data().transactions.get(txid).cloned()
    }

    pub fn list(&self) -> Vec<WalletTransaction> {
        self.wd.data().transactions.values().cloned().collect()
    }

    pub fn unconfirmed(&self) -> Vec<WalletTransaction> {
        self.wd
            .data()
            .transactions
            .values()
            .filter(|tx| !tx.is_confirmed())
            .cloned()
            .collect()
    }
}
