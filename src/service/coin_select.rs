//! UTXO 选币
//!
//! 选币是纯函数：候选 UTXO + 目标输出 + 每字节费率 → 选中的输入、输出（含找零）和手续费。
//! 金额在这里使用整数基础单位 (satoshi)。

use serde::{Deserialize, Serialize};

use crate::domain::wallet_data::ScriptType;

/// 交易固定开销（version + locktime + 计数）
pub const TX_OVERHEAD_BYTES: u64 = 10;
/// P2PKH / P2WPKH 输出
pub const TX_OUTPUT_BYTES: u64 = 34;

/// 按前序输出脚本类型估算的输入字节数（虚拟字节）
pub fn input_bytes(script_type: ScriptType) -> Option<u64> {
    match script_type {
        ScriptType::P2pkh => Some(148),
        ScriptType::P2sh => Some(91), // P2SH-P2WPKH
        ScriptType::P2wpkh => Some(68),
        ScriptType::P2wsh | ScriptType::NullData | ScriptType::Unknown => None,
    }
}

/// 低于此值的找零不值得花费
pub fn dust_threshold(fee_rate: u64) -> u64 {
    148u64.saturating_mul(fee_rate)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionInput {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub address: String,
    pub script_type: ScriptType,
}

/// 目标输出；`address` 为 None 表示找零，`value` 为 None 表示由 split 分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionTarget {
    pub address: Option<String>,
    pub value: Option<u64>,
}

impl SelectionTarget {
    pub fn pay(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: Some(address.into()),
            value: Some(value),
        }
    }

    pub fn sweep(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            value: None,
        }
    }

    pub fn is_change(&self) -> bool {
        self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub inputs: Vec<SelectionInput>,
    /// 所有输出都已定值；找零（如有）排在最后
    pub outputs: Vec<SelectionTarget>,
    pub fee: u64,
}

impl Selection {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn output_value(&self) -> u64 {
        self.outputs.iter().filter_map(|o| o.value).sum()
    }

    pub fn change(&self) -> Option<&SelectionTarget> {
        self.outputs.iter().find(|o| o.is_change())
    }
}

/// 选币策略；返回 None 表示余额不足
pub trait CoinSelector: Send + Sync {
    fn select(
        &self,
        candidates: &[SelectionInput],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection>;

    /// 花光全部候选，把扣费后的剩余平分给未定值的目标
    fn split(
        &self,
        candidates: &[SelectionInput],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection>;
}

/// 累积选币：按金额从大到小累加，跳过手续费高于面值的输入
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulativeSelector;

impl AccumulativeSelector {
    fn spendable(candidates: &[SelectionInput], fee_rate: u64) -> Vec<(SelectionInput, u64)> {
        let mut usable: Vec<(SelectionInput, u64)> = candidates
            .iter()
            .filter_map(|c| {
                let bytes = input_bytes(c.script_type)?;
                // 得不偿失的输入；费率溢出同样视为不可花费
                match bytes.checked_mul(fee_rate) {
                    Some(cost) if cost < c.value => {}
                    _ => return None,
                }
                Some((c.clone(), bytes))
            })
            .collect();
        usable.sort_by(|(a, _), (b, _)| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.txid.cmp(&b.txid))
                .then_with(|| a.vout.cmp(&b.vout))
        });
        usable
    }
}

impl CoinSelector for AccumulativeSelector {
    fn select(
        &self,
        candidates: &[SelectionInput],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection> {
        if targets.is_empty() {
            return None;
        }
        let mut out_value = 0u64;
        for target in targets {
            out_value = out_value.checked_add(target.value?)?;
        }

        let mut bytes =
            TX_OVERHEAD_BYTES.checked_add(TX_OUTPUT_BYTES.checked_mul(targets.len() as u64)?)?;
        let mut in_value = 0u64;
        let mut inputs = Vec::new();

        for (candidate, cost) in Self::spendable(candidates, fee_rate) {
            bytes = bytes.checked_add(cost)?;
            in_value = in_value.checked_add(candidate.value)?;
            inputs.push(candidate);

            let fee = bytes.checked_mul(fee_rate)?;
            let Some(remainder) = in_value.checked_sub(out_value.checked_add(fee)?) else {
                continue;
            };

            let mut outputs = targets.to_vec();
            let change_fee = TX_OUTPUT_BYTES.checked_mul(fee_rate)?;
            let fee = if remainder > change_fee.saturating_add(dust_threshold(fee_rate)) {
                outputs.push(SelectionTarget {
                    address: None,
                    value: Some(remainder - change_fee),
                });
                fee + change_fee
            } else {
                fee + remainder
            };

            return Some(Selection {
                inputs,
                outputs,
                fee,
            });
        }

        None
    }

    fn split(
        &self,
        candidates: &[SelectionInput],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection> {
        if targets.is_empty() {
            return None;
        }
        let usable = Self::spendable(candidates, fee_rate);
        if usable.is_empty() {
            return None;
        }

        let mut bytes =
            TX_OVERHEAD_BYTES.checked_add(TX_OUTPUT_BYTES.checked_mul(targets.len() as u64)?)?;
        let mut in_value = 0u64;
        for (candidate, cost) in &usable {
            bytes = bytes.checked_add(*cost)?;
            in_value = in_value.checked_add(candidate.value)?;
        }
        let fee = bytes.checked_mul(fee_rate)?;
        let mut fixed = 0u64;
        for value in targets.iter().filter_map(|t| t.value) {
            fixed = fixed.checked_add(value)?;
        }
        let remaining = in_value.checked_sub(fee.checked_add(fixed)?)?;

        let open = targets.iter().filter(|t| t.value.is_none()).count() as u64;
        let share = if open == 0 { 0 } else { remaining / open };
        if open > 0 && share <= dust_threshold(fee_rate) {
            return None;
        }

        let outputs = targets
            .iter()
            .map(|t| SelectionTarget {
                address: t.address.clone(),
                value: Some(t.value.unwrap_or(share)),
            })
            .collect::<Vec<_>>();
        let inputs = usable.into_iter().map(|(c, _)| c).collect::<Vec<_>>();

        // 平分的余数并入手续费
        let spent: u64 = outputs.iter().filter_map(|o| o.value).sum();
        Some(Selection {
            fee: in_value - spent,
            inputs,
            outputs,
        })
    }
}
