//! 手续费与选币
//!
//! 每个钱包在构造时按余额方案选定一种实现：
//! - `UtxoFeeProvider`：每字节费率 + `CoinSelector`
//! - `AccountFeeProvider`：gas_limit × gas_price

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    coin_select::{
        input_bytes, CoinSelector, Selection, SelectionInput, SelectionTarget, TX_OUTPUT_BYTES,
        TX_OVERHEAD_BYTES,
    },
    network::{GasEstimateRequest, NetworkClient},
    wallet_data_provider::WdProvider,
};
use crate::{
    domain::{
        coin::{Coin, FeeDefaults, FeeTiers},
        wallet_data::ScriptType,
    },
    error::{Result, WalletError},
    utils::amount::{from_base_units, to_base_units},
};

/// 速度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Low,
    Medium,
    High,
}

/// 某一时刻的三档费率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeRecord {
    /// satoshi/byte
    PerByte { low: u64, medium: u64, high: u64 },
    /// 以币为单位的 gas 价格
    Gas {
        low: Decimal,
        medium: Decimal,
        high: Decimal,
    },
}

impl FeeRecord {
    /// 描述中的静态费率
    pub fn from_defaults(coin: Coin) -> Self {
        match coin.descriptor().fee {
            FeeDefaults::PerByte(FeeTiers {
                low, default, high, ..
            }) => FeeRecord::PerByte {
                low,
                medium: default,
                high,
            },
            FeeDefaults::Gas { prices, .. } => FeeRecord::Gas {
                low: prices.low,
                medium: prices.default,
                high: prices.high,
            },
        }
    }

    pub fn options(&self, tier: FeeTier) -> FeeOptions {
        match *self {
            FeeRecord::PerByte { low, medium, high } => FeeOptions::PerByte {
                fee_rate: match tier {
                    FeeTier::Low => low,
                    FeeTier::Medium => medium,
                    FeeTier::High => high,
                },
            },
            FeeRecord::Gas { low, medium, high } => FeeOptions::Gas {
                gas_price: match tier {
                    FeeTier::Low => low,
                    FeeTier::Medium => medium,
                    FeeTier::High => high,
                },
                gas_limit: None,
            },
        }
    }
}

/// 交易使用的具体费用参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeOptions {
    PerByte {
        fee_rate: u64,
    },
    Gas {
        gas_price: Decimal,
        /// None 时按目标地址和金额估算
        gas_limit: Option<u64>,
    },
}

impl FeeOptions {
    pub fn fee_rate(&self) -> Result<u64> {
        match self {
            FeeOptions::PerByte { fee_rate } => Ok(*fee_rate),
            FeeOptions::Gas { .. } => Err(WalletError::UnsupportedScheme(
                "gas options passed to a per-byte fee provider".into(),
            )),
        }
    }

    pub fn gas(&self) -> Result<(Decimal, Option<u64>)> {
        match self {
            FeeOptions::Gas {
                gas_price,
                gas_limit,
            } => Ok((*gas_price, *gas_limit)),
            FeeOptions::PerByte { .. } => Err(WalletError::UnsupportedScheme(
                "per-byte options passed to a gas fee provider".into(),
            )),
        }
    }
}

/// 费率缓存，按获取时间和 TTL 判断是否过期
#[derive(Debug)]
pub struct FeeRecordCache {
    ttl: Duration,
    entry: Option<(FeeRecord, Instant)>,
}

impl FeeRecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn get(&self, now: Instant) -> Option<FeeRecord> {
        match self.entry {
            Some((record, fetched_at)) if now.saturating_duration_since(fetched_at) < self.ttl => {
                Some(record)
            }
            _ => None,
        }
    }

    pub fn put(&mut self, record: FeeRecord, now: Instant) {
        self.entry = Some((record, now));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[async_trait]
pub trait FeeProvider: Send + Sync {
    /// 网络费率；失败时退回静态费率，本方法不报错
    async fn fetch_fee_record(&self) -> FeeRecord;

    /// record 为 None 时使用静态费率
    fn fee_options(&self, tier: FeeTier, record: Option<&FeeRecord>) -> FeeOptions;

    /// 发送 value 需要的手续费（币为单位）
    async fn calculate_fee(
        &self,
        value: Decimal,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal>;

    /// 扣除手续费后最多能发送的金额
    async fn calculate_max_amount(
        &self,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal>;
}

fn lock_cache(cache: &Mutex<FeeRecordCache>) -> std::sync::MutexGuard<'_, FeeRecordCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============ UTXO ============

pub struct UtxoFeeProvider {
    coin: Coin,
    wd: Arc<WdProvider>,
    network: Arc<dyn NetworkClient>,
    selector: Arc<dyn CoinSelector>,
    cache: Mutex<FeeRecordCache>,
}

impl UtxoFeeProvider {
    pub fn new(
        wd: Arc<WdProvider>,
        network: Arc<dyn NetworkClient>,
        selector: Arc<dyn CoinSelector>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            coin: wd.coin(),
            wd,
            network,
            selector,
            cache: Mutex::new(FeeRecordCache::new(cache_ttl)),
        }
    }

    fn tiers(&self) -> FeeTiers<u64> {
        match self.coin.descriptor().fee {
            FeeDefaults::PerByte(tiers) => tiers,
            // 描述校验保证 UTXO 币种总是每字节费率
            FeeDefaults::Gas { .. } => FeeTiers {
                floor: 1,
                low: 1,
                default: 1,
                high: 1,
            },
        }
    }

    /// 已确认的未花费输出，换算成整数单位
    pub fn candidates(&self) -> Result<Vec<SelectionInput>> {
        let decimals = self.coin.decimals();
        self.wd
            .balance()
            .confirmed_unspent()
            .map(|u| {
                Ok(SelectionInput {
                    txid: u.txid.clone(),
                    vout: u.vout,
                    value: to_base_units(u.value, decimals)?,
                    address: u.address.clone(),
                    script_type: u.script_type,
                })
            })
            .collect()
    }

    fn available(&self) -> Decimal {
        self.wd.balance().confirmed_spendable()
    }

    /// 为一笔支付选币；余额不足返回 `InsufficientFunds`
    pub fn select(&self, value: Decimal, to: Option<&str>, fee_rate: u64) -> Result<Selection> {
        let units = to_base_units(value, self.coin.decimals())?;
        let target = SelectionTarget {
            address: Some(to.unwrap_or_default().to_string()),
            value: Some(units),
        };
        self.selector
            .select(&self.candidates()?, &[target], fee_rate)
            .ok_or_else(|| WalletError::InsufficientFunds {
                needed: value,
                available: self.available(),
            })
    }

    /// 全部余额发往一个地址
    pub fn split(&self, to: Option<&str>, fee_rate: u64) -> Result<Selection> {
        let target = SelectionTarget::sweep(to.unwrap_or_default());
        self.selector
            .split(&self.candidates()?, &[target], fee_rate)
            .ok_or_else(|| {
                let minimum = (TX_OVERHEAD_BYTES
                    + TX_OUTPUT_BYTES
                    + input_bytes(ScriptType::P2wpkh).unwrap_or_default())
                .saturating_mul(fee_rate);
                WalletError::InsufficientFunds {
                    needed: from_base_units(minimum, self.coin.decimals()),
                    available: self.available(),
                }
            })
    }
}

#[async_trait]
impl FeeProvider for UtxoFeeProvider {
    async fn fetch_fee_record(&self) -> FeeRecord {
        let now = Instant::now();
        let cached = lock_cache(&self.cache).get(now);
        if let Some(record) = cached {
            return record;
        }

        let tiers = self.tiers();
        match self.network.get_fee_record().await {
            Ok(rates) => {
                let clamp = |rate: u64, fallback: u64| {
                    if rate < tiers.floor {
                        fallback
                    } else {
                        rate
                    }
                };
                let record = FeeRecord::PerByte {
                    low: clamp(rates.low, tiers.low),
                    medium: clamp(rates.medium, tiers.default),
                    high: clamp(rates.high, tiers.high),
                };
                lock_cache(&self.cache).put(record, now);
                record
            }
            Err(e) => {
                tracing::warn!(coin = %self.coin, error = %e, "fee record unavailable, using static rates");
                FeeRecord::from_defaults(self.coin)
            }
        }
    }

    fn fee_options(&self, tier: FeeTier, record: Option<&FeeRecord>) -> FeeOptions {
        match record {
            Some(record @ FeeRecord::PerByte { .. }) => record.options(tier),
            _ => FeeRecord::from_defaults(self.coin).options(tier),
        }
    }

    async fn calculate_fee(
        &self,
        value: Decimal,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal> {
        let selection = self.select(value, address, options.fee_rate()?)?;
        Ok(from_base_units(selection.fee, self.coin.decimals()))
    }

    async fn calculate_max_amount(
        &self,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal> {
        let selection = self.split(address, options.fee_rate()?)?;
        Ok(from_base_units(
            selection.output_value(),
            self.coin.decimals(),
        ))
    }
}

// ============ Account ============

pub struct AccountFeeProvider {
    coin: Coin,
    wd: Arc<WdProvider>,
    network: Arc<dyn NetworkClient>,
    cache: Mutex<FeeRecordCache>,
}

impl AccountFeeProvider {
    pub fn new(wd: Arc<WdProvider>, network: Arc<dyn NetworkClient>, cache_ttl: Duration) -> Self {
        Self {
            coin: wd.coin(),
            wd,
            network,
            cache: Mutex::new(FeeRecordCache::new(cache_ttl)),
        }
    }

    pub fn min_gas_limit(&self) -> u64 {
        self.coin.descriptor().min_gas_limit().unwrap_or(21_000)
    }

    /// 没有目标地址或金额时取协议最小值；估算失败同样退回最小值
    pub async fn estimate_gas_limit(&self, to: Option<&str>, value: Option<Decimal>) -> u64 {
        let minimum = self.min_gas_limit();
        let (Some(to), Some(value)) = (to, value) else {
            return minimum;
        };

        let from = self
            .wd
            .address()
            .list(None)
            .into_iter()
            .next()
            .map(|a| a.address);
        let request = GasEstimateRequest {
            from,
            to: to.to_string(),
            value,
        };
        match self.network.estimate_gas(&request).await {
            Ok(estimate) => estimate.max(minimum),
            Err(e) => {
                tracing::warn!(coin = %self.coin, to, error = %e, "gas estimation failed, using minimum");
                minimum
            }
        }
    }

    /// 待确认支出已计入 spend，这里只扣除未确认收入
    fn available(&self) -> Decimal {
        self.wd.balance().confirmed_spendable()
    }

    async fn gas_fee(
        &self,
        options: &FeeOptions,
        to: Option<&str>,
        value: Option<Decimal>,
    ) -> Result<(Decimal, u64)> {
        let (gas_price, gas_limit) = options.gas()?;
        let gas_limit = match gas_limit {
            Some(limit) => limit.max(self.min_gas_limit()),
            None => self.estimate_gas_limit(to, value).await,
        };
        Ok((gas_price * Decimal::from(gas_limit), gas_limit))
    }
}

#[async_trait]
impl FeeProvider for AccountFeeProvider {
    async fn fetch_fee_record(&self) -> FeeRecord {
        let now = Instant::now();
        let cached = lock_cache(&self.cache).get(now);
        if let Some(record) = cached {
            return record;
        }

        let floor = match self.coin.descriptor().fee {
            FeeDefaults::Gas { prices, .. } => prices.floor,
            FeeDefaults::PerByte(_) => Decimal::ZERO,
        };
        let decimals = self.coin.decimals();

        match self.network.get_gas_price().await {
            Ok(price) if price >= floor => {
                // 三档倍数 1.0 / 1.2 / 1.5
                let record = FeeRecord::Gas {
                    low: price,
                    medium: (price * Decimal::new(12, 1)).round_dp(decimals),
                    high: (price * Decimal::new(15, 1)).round_dp(decimals),
                };
                lock_cache(&self.cache).put(record, now);
                record
            }
            Ok(price) => {
                tracing::warn!(coin = %self.coin, %price, %floor, "gas price below floor, using static prices");
                FeeRecord::from_defaults(self.coin)
            }
            Err(e) => {
                tracing::warn!(coin = %self.coin, error = %e, "gas price unavailable, using static prices");
                FeeRecord::from_defaults(self.coin)
            }
        }
    }

    fn fee_options(&self, tier: FeeTier, record: Option<&FeeRecord>) -> FeeOptions {
        match record {
            Some(record @ FeeRecord::Gas { .. }) => record.options(tier),
            _ => FeeRecord::from_defaults(self.coin).options(tier),
        }
    }

    async fn calculate_fee(
        &self,
        value: Decimal,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal> {
        let (fee, _) = self.gas_fee(options, address, Some(value)).await?;
        Ok(fee)
    }

    async fn calculate_max_amount(
        &self,
        options: &FeeOptions,
        address: Option<&str>,
    ) -> Result<Decimal> {
        let (fee, _) = self.gas_fee(options, address, None).await?;
        let available = self.available();
        let max = available - fee;
        if max.is_sign_negative() {
            return Err(WalletError::InsufficientFunds {
                needed: fee,
                available,
            });
        }
        Ok(max)
    }
}
