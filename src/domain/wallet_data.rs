//! 钱包数据聚合根
//!
//! 一个币种 + 一个账户的全部状态：有序地址列表、txid → 交易映射。
//! 本身只有纯函数，修改都经由 `WdProvider` 的写时复制完成。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    coin::{Coin, TransactionScheme},
    derivation::DerivationType,
};

/// 钱包追踪的一个派生地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: String,
    pub derivation_type: DerivationType,
    pub index: u32,
    pub account: u32,
}

/// 输出脚本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pkh,
    /// 由本钱包派生时为 P2SH-P2WPKH
    P2sh,
    P2wpkh,
    P2wsh,
    NullData,
    #[serde(other)]
    Unknown,
}

impl ScriptType {
    /// 本钱包能签名的脚本
    pub fn is_signable(self) -> bool {
        matches!(self, ScriptType::P2pkh | ScriptType::P2sh | ScriptType::P2wpkh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
    pub prev_txid: String,
    pub prev_index: u32,
    pub sequence: u32,
    /// 十六进制
    #[serde(default)]
    pub sig_script: String,
    #[serde(default)]
    pub witness: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutput {
    pub value: Decimal,
    pub addresses: Vec<String>,
    /// 十六进制锁定脚本
    #[serde(default)]
    pub script: String,
    pub script_type: ScriptType,
}

/// 账户模型转账
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransfer {
    pub from: String,
    pub to: String,
    pub value: Decimal,
    pub nonce: u64,
    /// 以币为单位
    pub gas_price: Decimal,
    pub gas_limit: u64,
    pub gas_used: Option<u64>,
    /// 回执状态：None = 未确认
    pub status: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDetail {
    InputsOutputs {
        inputs: Vec<UtxoInput>,
        outputs: Vec<UtxoOutput>,
    },
    FromTo(AccountTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub coin: Coin,
    pub txid: String,
    /// None = 未确认
    pub block_height: Option<u64>,
    pub block_time: Option<DateTime<Utc>>,
    pub detail: TransactionDetail,
}

impl WalletTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.block_height.is_some()
    }

    pub fn scheme(&self) -> TransactionScheme {
        match self.detail {
            TransactionDetail::InputsOutputs { .. } => TransactionScheme::InputsOutputs,
            TransactionDetail::FromTo(_) => TransactionScheme::FromTo,
        }
    }

    /// 同 txid 合并：确认信息、回执、见证数据只增不减
    pub fn merge(&self, newer: &WalletTransaction) -> WalletTransaction {
        let mut merged = newer.clone();
        merged.block_height = newer.block_height.or(self.block_height);
        merged.block_time = newer.block_time.or(self.block_time);

        match (&self.detail, &mut merged.detail) {
            (TransactionDetail::FromTo(old), TransactionDetail::FromTo(new)) => {
                new.gas_used = new.gas_used.or(old.gas_used);
                new.status = new.status.or(old.status);
            }
            (
                TransactionDetail::InputsOutputs {
                    inputs: old_inputs,
                    outputs: old_outputs,
                },
                TransactionDetail::InputsOutputs { inputs, outputs },
            ) => {
                if inputs.is_empty() {
                    *inputs = old_inputs.clone();
                }
                if outputs.is_empty() {
                    *outputs = old_outputs.clone();
                }
                for (input, old) in inputs.iter_mut().zip(old_inputs) {
                    if input.sig_script.is_empty() {
                        input.sig_script = old.sig_script.clone();
                    }
                    if input.witness.is_empty() {
                        input.witness = old.witness.clone();
                    }
                }
            }
            // 方案不一致时以新数据为准
            _ => {}
        }

        merged
    }
}

/// 一次 set_data 的增量
#[derive(Debug, Clone, Default)]
pub struct WalletDataPatch {
    pub addresses: Vec<WalletAddress>,
    pub transactions: Vec<WalletTransaction>,
}

impl WalletDataPatch {
    pub fn addresses(addresses: Vec<WalletAddress>) -> Self {
        Self {
            addresses,
            transactions: Vec::new(),
        }
    }

    pub fn transactions(transactions: Vec<WalletTransaction>) -> Self {
        Self {
            addresses: Vec::new(),
            transactions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.transactions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletData {
    pub coin: Coin,
    pub account: u32,
    pub addresses: Vec<WalletAddress>,
    pub transactions: BTreeMap<String, WalletTransaction>,
}

impl WalletData {
    pub fn new(coin: Coin, account: u32) -> Self {
        Self {
            coin,
            account,
            addresses: Vec::new(),
            transactions: BTreeMap::new(),
        }
    }

    pub fn find_address(&self, address: &str) -> Option<&WalletAddress> {
        self.addresses.iter().find(|a| a.address == address)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.find_address(address).is_some()
    }

    /// 指定类型下一个未使用的索引（单调递增，不复用）
    pub fn next_index(&self, derivation_type: DerivationType) -> u32 {
        self.addresses
            .iter()
            .filter(|a| a.derivation_type == derivation_type && a.account == self.account)
            .map(|a| a.index + 1)
            .max()
            .unwrap_or(0)
    }

    /// 写时复制：返回合并补丁后的新版本，原版本不变
    pub fn apply(&self, patch: &WalletDataPatch) -> WalletData {
        let mut next = self.clone();

        for address in &patch.addresses {
            if !next.contains_address(&address.address) {
                next.addresses.push(address.clone());
            }
        }

        for tx in &patch.transactions {
            let merged = match next.transactions.get(&tx.txid) {
                Some(existing) => existing.merge(tx),
                None => tx.clone(),
            };
            next.transactions.insert(tx.txid.clone(), merged);
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str, index: u32, derivation_type: DerivationType) -> WalletAddress {
        WalletAddress {
            address: s.to_string(),
            derivation_type,
            index,
            account: 0,
        }
    }

    fn transfer(txid: &str, block_height: Option<u64>, status: Option<bool>) -> WalletTransaction {
        WalletTransaction {
            coin: Coin::Ethereum,
            txid: txid.to_string(),
            block_height,
            block_time: None,
            detail: TransactionDetail::FromTo(AccountTransfer {
                from: "0xa".into(),
                to: "0xb".into(),
                value: Decimal::ONE,
                nonce: 0,
                gas_price: Decimal::new(20, 9),
                gas_limit: 21_000,
                gas_used: block_height.map(|_| 21_000),
                status,
            }),
        }
    }

    #[test]
    fn test_apply_is_copy_on_write() {
        let data = WalletData::new(Coin::Ethereum, 0);
        let patch = WalletDataPatch::addresses(vec![address("0xa", 0, DerivationType::Receive)]);

        let next = data.apply(&patch);
        assert!(data.addresses.is_empty());
        assert_eq!(next.addresses.len(), 1);
    }

    #[test]
    fn test_apply_dedups_addresses() {
        let data = WalletData::new(Coin::Bitcoin, 0);
        let a = address("bc1qa", 0, DerivationType::Receive);
        let patch = WalletDataPatch::addresses(vec![a.clone(), a.clone()]);
        let next = data.apply(&patch).apply(&patch);
        assert_eq!(next.addresses, vec![a]);
    }

    #[test]
    fn test_next_index_is_monotonic_per_type() {
        let data = WalletData::new(Coin::Bitcoin, 0).apply(&WalletDataPatch::addresses(vec![
            address("r0", 0, DerivationType::Receive),
            address("r1", 1, DerivationType::Receive),
            address("c0", 0, DerivationType::Change),
        ]));
        assert_eq!(data.next_index(DerivationType::Receive), 2);
        assert_eq!(data.next_index(DerivationType::Change), 1);
    }

    #[test]
    fn test_merge_keeps_confirmation() {
        let confirmed = transfer("t1", Some(100), Some(true));
        let stale = transfer("t1", None, None);

        let data = WalletData::new(Coin::Ethereum, 0)
            .apply(&WalletDataPatch::transactions(vec![confirmed.clone()]))
            .apply(&WalletDataPatch::transactions(vec![stale]));

        let merged = &data.transactions["t1"];
        assert_eq!(merged.block_height, Some(100));
        match &merged.detail {
            TransactionDetail::FromTo(t) => {
                assert_eq!(t.status, Some(true));
                assert_eq!(t.gas_used, Some(21_000));
            }
            _ => panic!("unexpected scheme"),
        }
    }

    #[test]
    fn test_serde_preserves_order() {
        let data = WalletData::new(Coin::Ethereum, 0).apply(&WalletDataPatch {
            addresses: vec![
                address("0xb", 1, DerivationType::Receive),
                address("0xa", 0, DerivationType::Receive),
            ],
            transactions: vec![transfer("t2", None, None), transfer("t1", Some(1), Some(false))],
        });

        let json = serde_json::to_string(&data).unwrap();
        let back: WalletData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
        assert_eq!(back.addresses[0].address, "0xb");
    }

    #[test]
    fn test_unknown_script_type_deserializes() {
        let ty: ScriptType = serde_json::from_str("\"witness_v1_taproot\"").unwrap();
        assert_eq!(ty, ScriptType::Unknown);
        assert!(!ty.is_signable());
    }
}
