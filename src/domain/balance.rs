//! 余额计算
//!
//! 余额是 (WalletData, 币种描述) 的纯函数，每次读取时重新推导

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use super::{
    coin::BalanceScheme,
    wallet_data::{ScriptType, TransactionDetail, WalletData, WalletTransaction},
};
use crate::error::{Result, WalletError};

/// 地址余额
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub receive: Decimal,
    pub spend: Decimal,
    /// 其中尚未确认的收入
    pub unconfirmed: Decimal,
}

impl AddressBalance {
    pub fn total(&self) -> Decimal {
        self.receive - self.spend
    }

    /// 从未有过收支
    pub fn is_pure(&self) -> bool {
        self.receive.is_zero() && self.spend.is_zero()
    }
}

/// 交易余额（相对本钱包）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionBalance {
    pub receive: Decimal,
    pub spend: Decimal,
    pub fee: Decimal,
}

/// 未花费输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub value: Decimal,
    /// 本钱包追踪的地址
    pub address: String,
    pub confirmed: bool,
    pub script: String,
    pub script_type: ScriptType,
}

#[derive(Debug, Clone, Serialize)]
pub struct WdBalance {
    scheme: BalanceScheme,
    addresses: BTreeMap<String, AddressBalance>,
    transactions: BTreeMap<String, TransactionBalance>,
    unspent: Vec<UnspentOutput>,
}

impl WdBalance {
    pub fn scheme(&self) -> BalanceScheme {
        self.scheme
    }

    /// 未被追踪的地址返回 None；追踪但未使用的地址为全零
    pub fn address(&self, address: &str) -> Option<&AddressBalance> {
        self.addresses.get(address)
    }

    pub fn addresses(&self) -> &BTreeMap<String, AddressBalance> {
        &self.addresses
    }

    pub fn is_pure(&self, address: &str) -> bool {
        self.address(address).map_or(true, AddressBalance::is_pure)
    }

    pub fn transaction(&self, txid: &str) -> Result<&TransactionBalance> {
        self.transactions
            .get(txid)
            .ok_or_else(|| WalletError::BalanceLookup(txid.to_string()))
    }

    pub fn transactions(&self) -> &BTreeMap<String, TransactionBalance> {
        &self.transactions
    }

    /// 按 (txid, vout) 排序
    pub fn unspent(&self) -> &[UnspentOutput] {
        &self.unspent
    }

    pub fn confirmed_unspent(&self) -> impl Iterator<Item = &UnspentOutput> {
        self.unspent.iter().filter(|u| u.confirmed)
    }

    /// 收入 - 支出
    pub fn total(&self) -> Decimal {
        self.addresses.values().map(AddressBalance::total).sum()
    }

    pub fn unconfirmed(&self) -> Decimal {
        self.addresses.values().map(|b| b.unconfirmed).sum()
    }

    /// 可立即花费的余额
    ///
    /// UTXO：已确认未花费输出之和；账户：收入 - 未确认收入 - 支出
    pub fn confirmed_spendable(&self) -> Decimal {
        match self.scheme {
            BalanceScheme::Utxo => self.confirmed_unspent().map(|u| u.value).sum(),
            BalanceScheme::Account => self
                .addresses
                .values()
                .map(|b| b.receive - b.unconfirmed - b.spend)
                .sum(),
        }
    }
}

pub struct BalanceCalculator;

impl BalanceCalculator {
    pub fn calculate(data: &WalletData) -> WdBalance {
        let scheme = data.coin.balance_scheme();
        let mut balance = WdBalance {
            scheme,
            addresses: data
                .addresses
                .iter()
                .map(|a| (a.address.clone(), AddressBalance::default()))
                .collect(),
            // 每个追踪的交易都有条目，即使与本钱包无关
            transactions: data
                .transactions
                .keys()
                .map(|txid| (txid.clone(), TransactionBalance::default()))
                .collect(),
            unspent: Vec::new(),
        };

        match scheme {
            BalanceScheme::Utxo => calculate_utxo(data, &mut balance),
            BalanceScheme::Account => calculate_account(data, &mut balance),
        }

        balance
    }
}

fn calculate_utxo(data: &WalletData, balance: &mut WdBalance) {
    let tracked: HashSet<&str> = data.addresses.iter().map(|a| a.address.as_str()).collect();

    // (prev txid, prev index) -> 花费它的交易
    let mut spent_by: HashMap<(&str, u32), &str> = HashMap::new();
    for tx in data.transactions.values() {
        if let TransactionDetail::InputsOutputs { inputs, .. } = &tx.detail {
            for input in inputs {
                spent_by.insert((input.prev_txid.as_str(), input.prev_index), tx.txid.as_str());
            }
        }
    }

    for tx in data.transactions.values() {
        let outputs = match &tx.detail {
            TransactionDetail::InputsOutputs { outputs, .. } => outputs,
            TransactionDetail::FromTo(_) => {
                tracing::warn!(txid = %tx.txid, "skipping account transaction in utxo wallet");
                continue;
            }
        };

        for (vout, output) in outputs.iter().enumerate() {
            let Some(owner) = output
                .addresses
                .iter()
                .find(|a| tracked.contains(a.as_str()))
            else {
                continue;
            };
            let vout = vout as u32;

            let address = balance.addresses.entry(owner.clone()).or_default();
            address.receive += output.value;
            if !tx.is_confirmed() {
                address.unconfirmed += output.value;
            }
            if let Some(entry) = balance.transactions.get_mut(&tx.txid) {
                entry.receive += output.value;
            }

            match spent_by.get(&(tx.txid.as_str(), vout)) {
                Some(spender) => {
                    address.spend += output.value;
                    if let Some(entry) = balance.transactions.get_mut(*spender) {
                        entry.spend += output.value;
                    }
                }
                None => balance.unspent.push(UnspentOutput {
                    txid: tx.txid.clone(),
                    vout,
                    value: output.value,
                    address: owner.clone(),
                    confirmed: tx.is_confirmed(),
                    script: output.script.clone(),
                    script_type: output.script_type,
                }),
            }
        }
    }

    // 手续费 = 消耗的本钱包输出 - 回到本钱包的输出，下限为 0
    for entry in balance.transactions.values_mut() {
        entry.fee = (entry.spend - entry.receive).max(Decimal::ZERO);
    }

    balance
        .unspent
        .sort_by(|a, b| a.txid.cmp(&b.txid).then(a.vout.cmp(&b.vout)));
}

fn account_gas(
    tx: &WalletTransaction,
    gas_price: Decimal,
    gas_limit: u64,
    gas_used: Option<u64>,
) -> Decimal {
    let units = if tx.is_confirmed() {
        gas_used.unwrap_or(gas_limit)
    } else {
        gas_limit
    };
    Decimal::from(units) * gas_price
}

fn calculate_account(data: &WalletData, balance: &mut WdBalance) {
    // 账户地址大小写不敏感
    let tracked: HashMap<String, &str> = data
        .addresses
        .iter()
        .map(|a| (a.address.to_lowercase(), a.address.as_str()))
        .collect();

    for tx in data.transactions.values() {
        let transfer = match &tx.detail {
            TransactionDetail::FromTo(t) => t,
            TransactionDetail::InputsOutputs { .. } => {
                tracing::warn!(txid = %tx.txid, "skipping utxo transaction in account wallet");
                continue;
            }
        };

        let confirmed = tx.is_confirmed();
        let gas = account_gas(tx, transfer.gas_price, transfer.gas_limit, transfer.gas_used);
        // 未确认的按成功处理；已确认的以回执为准
        let counts = !confirmed || transfer.status == Some(true);

        if let Some(to) = tracked.get(&transfer.to.to_lowercase()) {
            let address = balance.addresses.entry(to.to_string()).or_default();
            if counts {
                address.receive += transfer.value;
                if let Some(entry) = balance.transactions.get_mut(&tx.txid) {
                    entry.receive += transfer.value;
                }
            }
            if !confirmed {
                address.unconfirmed += transfer.value;
            }
        }

        if let Some(from) = tracked.get(&transfer.from.to_lowercase()) {
            let address = balance.addresses.entry(from.to_string()).or_default();
            let spent = if counts { gas + transfer.value } else { gas };
            address.spend += spent;
            if let Some(entry) = balance.transactions.get_mut(&tx.txid) {
                entry.spend += spent;
                entry.fee += gas;
            }
        }
    }
}
