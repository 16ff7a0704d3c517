//! 测试辅助模块
//! 内存版网络（MockNetwork）与交易构造工具

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot};
use walletcore::{
    domain::{
        AccountTransfer, Coin, ScriptType, Seed, TransactionDetail, UtxoInput, UtxoOutput,
        WalletTransaction,
    },
    error::{Result, WalletError},
    service::{FeeRates, GasEstimateRequest, NetworkClient, NetworkEvents},
};

/// BIP84 测试向量助记词
pub const MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// BIP84 m/84'/0'/0'/0/0 与 m/84'/0'/0'/1/0
pub const BTC_RECEIVE_0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
pub const BTC_CHANGE_0: &str = "bc1q8c6fshw2dlwun7ekn9qwf37cu2rn755upcp6el";
/// m/44'/60'/0'/0/0
pub const ETH_RECEIVE_0: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

pub const BTC_EXTERNAL: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
pub const ETH_EXTERNAL: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

pub fn seed() -> Seed {
    Seed::from_mnemonic(MNEMONIC, "").expect("valid mnemonic")
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("walletcore=debug")
        .with_test_writer()
        .try_init();
}

/// 合法的 64 位十六进制 txid
pub fn fake_txid(n: u64) -> String {
    format!("{:064x}", n)
}

pub fn sats(n: i64) -> Decimal {
    Decimal::new(n, 8)
}

pub fn gwei(n: i64) -> Decimal {
    Decimal::new(n, 9)
}

/// 外部输入 -> 若干输出
pub fn utxo_tx(
    coin: Coin,
    txid: &str,
    inputs: &[(&str, u32)],
    outputs: &[(&str, Decimal, ScriptType)],
    height: Option<u64>,
) -> WalletTransaction {
    WalletTransaction {
        coin,
        txid: txid.to_string(),
        block_height: height,
        block_time: None,
        detail: TransactionDetail::InputsOutputs {
            inputs: inputs
                .iter()
                .map(|(prev, index)| UtxoInput {
                    prev_txid: prev.to_string(),
                    prev_index: *index,
                    sequence: u32::MAX,
                    sig_script: String::new(),
                    witness: vec![],
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|(address, value, script_type)| UtxoOutput {
                    value: *value,
                    addresses: vec![address.to_string()],
                    script: String::new(),
                    script_type: *script_type,
                })
                .collect(),
        },
    }
}

#[allow(clippy::too_many_arguments)]
pub fn eth_tx(
    txid: &str,
    from: &str,
    to: &str,
    value: Decimal,
    nonce: u64,
    gas_used: Option<u64>,
    status: Option<bool>,
    height: Option<u64>,
) -> WalletTransaction {
    WalletTransaction {
        coin: Coin::Ethereum,
        txid: txid.to_string(),
        block_height: height,
        block_time: None,
        detail: TransactionDetail::FromTo(AccountTransfer {
            from: from.to_string(),
            to: to.to_string(),
            value,
            nonce,
            gas_price: gwei(20),
            gas_limit: 21_000,
            gas_used,
            status,
        }),
    }
}

/// 内存网络：按地址返回历史，记录广播
#[derive(Default)]
pub struct MockNetwork {
    history: Mutex<HashMap<String, Vec<WalletTransaction>>>,
    by_txid: Mutex<HashMap<String, WalletTransaction>>,
    failing: Mutex<HashSet<String>>,
    broadcasts: Mutex<Vec<String>>,
    fee_rates: Mutex<Option<FeeRates>>,
    gas_price: Mutex<Option<Decimal>>,
    gas_estimate: Mutex<Option<u64>>,
    pub bulk_calls: AtomicUsize,
    pub fee_calls: AtomicUsize,
    blocks: Mutex<Option<broadcast::Sender<u64>>>,
    activity: Mutex<Vec<mpsc::Sender<WalletTransaction>>>,
    confirms: Mutex<HashMap<String, oneshot::Sender<WalletTransaction>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        let (blocks, _) = broadcast::channel(16);
        Self {
            blocks: Mutex::new(Some(blocks)),
            ..Self::default()
        }
    }

    /// 把交易挂到它涉及的每个地址下
    pub fn add_tx(&self, tx: WalletTransaction) {
        let addresses: Vec<String> = match &tx.detail {
            TransactionDetail::InputsOutputs { outputs, .. } => {
                outputs
                    .iter()
                    .flat_map(|o| o.addresses.iter().map(|a| a.to_lowercase()))
                    .collect()
            }
            TransactionDetail::FromTo(t) => vec![t.from.to_lowercase(), t.to.to_lowercase()],
        };
        let mut history = self.history.lock().unwrap();
        for address in addresses {
            history.entry(address).or_default().push(tx.clone());
        }
        self.by_txid.lock().unwrap().insert(tx.txid.clone(), tx);
    }

    /// 只更新 get_tx 的返回值
    pub fn set_tx(&self, tx: WalletTransaction) {
        self.by_txid.lock().unwrap().insert(tx.txid.clone(), tx);
    }

    pub fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn set_fee_rates(&self, rates: FeeRates) {
        *self.fee_rates.lock().unwrap() = Some(rates);
    }

    pub fn set_gas_price(&self, price: Decimal) {
        *self.gas_price.lock().unwrap() = Some(price);
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        *self.gas_estimate.lock().unwrap() = Some(gas);
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn emit_block(&self, height: u64) {
        if let Some(sender) = self.blocks.lock().unwrap().as_ref() {
            let _ = sender.send(height);
        }
    }

    pub async fn emit_activity(&self, tx: WalletTransaction) {
        let senders = self.activity.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(tx.clone()).await;
        }
    }

    pub fn confirm(&self, tx: WalletTransaction) {
        if let Some(sender) = self.confirms.lock().unwrap().remove(&tx.txid) {
            let _ = sender.send(tx);
        }
    }

    /// 关闭所有订阅
    pub fn close_events(&self) {
        self.blocks.lock().unwrap().take();
        self.activity.lock().unwrap().clear();
        self.confirms.lock().unwrap().clear();
    }
}

#[async_trait]
impl NetworkClient for MockNetwork {
    async fn get_address_txs(&self, address: &str) -> Result<Vec<WalletTransaction>> {
        if self.failing.lock().unwrap().contains(address) {
            return Err(WalletError::network(format!("{} unreachable", address)));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_bulk_addr_txs(&self, addresses: &[String]) -> Result<Vec<WalletTransaction>> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let mut all = Vec::new();
        for address in addresses {
            all.extend(self.get_address_txs(address).await?);
        }
        Ok(all)
    }

    async fn get_tx(&self, txid: &str) -> Result<Option<WalletTransaction>> {
        Ok(self.by_txid.lock().unwrap().get(txid).cloned())
    }

    async fn broadcast_transaction(&self, raw_hex: &str) -> Result<String> {
        let mut broadcasts = self.broadcasts.lock().unwrap();
        broadcasts.push(raw_hex.to_string());
        Ok(format!("remote-{}", broadcasts.len()))
    }

    async fn get_fee_record(&self) -> Result<FeeRates> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        (*self.fee_rates.lock().unwrap()).ok_or_else(|| WalletError::network("no fee estimate"))
    }

    async fn get_gas_price(&self) -> Result<Decimal> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        (*self.gas_price.lock().unwrap()).ok_or_else(|| WalletError::network("no gas price"))
    }

    async fn estimate_gas(&self, _request: &GasEstimateRequest) -> Result<u64> {
        (*self.gas_estimate.lock().unwrap()).ok_or_else(|| WalletError::network("estimate failed"))
    }
}

impl NetworkEvents for MockNetwork {
    fn on_block(&self) -> broadcast::Receiver<u64> {
        match self.blocks.lock().unwrap().as_ref() {
            Some(sender) => sender.subscribe(),
            // 已关闭：返回立即结束的订阅
            None => broadcast::channel(1).1,
        }
    }

    fn on_address_activity(&self, _addresses: &[String]) -> mpsc::Receiver<WalletTransaction> {
        let (tx, rx) = mpsc::channel(16);
        self.activity.lock().unwrap().push(tx);
        rx
    }

    fn on_tx_confirm(&self, txid: &str) -> oneshot::Receiver<WalletTransaction> {
        let (tx, rx) = oneshot::channel();
        self.confirms.lock().unwrap().insert(txid.to_string(), tx);
        rx
    }
}
