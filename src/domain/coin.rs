//! 币种能力描述
//!
//! 每个币种对应一个静态 `CoinDescriptor`，多态组件只匹配余额方案/交易方案，
//! 从不匹配具体币种

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::key_format::{KeyFormat, UtxoNetworkParams};

/// 余额方案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceScheme {
    /// 未花费输出模型 (Bitcoin 系列)
    Utxo,
    /// 账户模型 (Ethereum 系列)
    Account,
}

/// 交易方案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionScheme {
    InputsOutputs,
    FromTo,
}

/// 支持的币种
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Coin {
    Bitcoin,
    BitcoinTestnet,
    Litecoin,
    Dogecoin,
    Ethereum,
    EthereumSepolia,
}

/// 手续费分档
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeTiers<T> {
    /// 网络返回值低于该值时回退到静态费率
    pub floor: T,
    pub low: T,
    pub default: T,
    pub high: T,
}

/// 静态手续费默认值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeDefaults {
    /// 每字节最小单位 (satoshi/byte)
    PerByte(FeeTiers<u64>),
    /// gas 价格（以币为单位）与协议最小 gas limit
    Gas {
        prices: FeeTiers<Decimal>,
        min_gas_limit: u64,
    },
}

/// 币种描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinDescriptor {
    pub coin: Coin,
    pub name: &'static str,
    /// 单位符号 (BTC, ETH, ...)
    pub unit: &'static str,
    pub decimals: u32,
    /// SLIP-44 coin type
    pub hd_coin_type: u32,
    pub balance_scheme: BalanceScheme,
    pub transaction_scheme: TransactionScheme,
    pub key_format: KeyFormat,
    pub segwit: bool,
    pub is_testnet: bool,
    /// EIP-155 chain id（仅账户模型）
    pub chain_id: Option<u64>,
    pub fee: FeeDefaults,
}

const fn sat_tiers(floor: u64, low: u64, default: u64, high: u64) -> FeeTiers<u64> {
    FeeTiers {
        floor,
        low,
        default,
        high,
    }
}

fn gwei(value: i64) -> Decimal {
    Decimal::new(value, 9)
}

fn gas_tiers() -> FeeTiers<Decimal> {
    FeeTiers {
        floor: gwei(1),
        low: gwei(10),
        default: gwei(20),
        high: gwei(50),
    }
}

impl Coin {
    pub const fn all() -> &'static [Coin] {
        &[
            Coin::Bitcoin,
            Coin::BitcoinTestnet,
            Coin::Litecoin,
            Coin::Dogecoin,
            Coin::Ethereum,
            Coin::EthereumSepolia,
        ]
    }

    pub fn descriptor(self) -> CoinDescriptor {
        match self {
            Coin::Bitcoin => CoinDescriptor {
                coin: self,
                name: "Bitcoin",
                unit: "BTC",
                decimals: 8,
                hd_coin_type: 0,
                balance_scheme: BalanceScheme::Utxo,
                transaction_scheme: TransactionScheme::InputsOutputs,
                key_format: KeyFormat::Utxo(UtxoNetworkParams {
                    p2pkh: 0x00,
                    p2sh: 0x05,
                    wif: 0x80,
                    bech32_hrp: Some("bc"),
                }),
                segwit: true,
                is_testnet: false,
                chain_id: None,
                fee: FeeDefaults::PerByte(sat_tiers(1, 5, 10, 25)),
            },
            Coin::BitcoinTestnet => CoinDescriptor {
                coin: self,
                name: "Bitcoin Testnet",
                unit: "tBTC",
                decimals: 8,
                hd_coin_type: 1,
                balance_scheme: BalanceScheme::Utxo,
                transaction_scheme: TransactionScheme::InputsOutputs,
                key_format: KeyFormat::Utxo(UtxoNetworkParams {
                    p2pkh: 0x6f,
                    p2sh: 0xc4,
                    wif: 0xef,
                    bech32_hrp: Some("tb"),
                }),
                segwit: true,
                is_testnet: true,
                chain_id: None,
                fee: FeeDefaults::PerByte(sat_tiers(1, 1, 2, 5)),
            },
            Coin::Litecoin => CoinDescriptor {
                coin: self,
                name: "Litecoin",
                unit: "LTC",
                decimals: 8,
                hd_coin_type: 2,
                balance_scheme: BalanceScheme::Utxo,
                transaction_scheme: TransactionScheme::InputsOutputs,
                key_format: KeyFormat::Utxo(UtxoNetworkParams {
                    p2pkh: 0x30,
                    p2sh: 0x32,
                    wif: 0xb0,
                    bech32_hrp: Some("ltc"),
                }),
                segwit: true,
                is_testnet: false,
                chain_id: None,
                fee: FeeDefaults::PerByte(sat_tiers(1, 5, 10, 20)),
            },
            // Dogecoin 没有 SegWit，费率按 0.01 DOGE/kB 起
            Coin::Dogecoin => CoinDescriptor {
                coin: self,
                name: "Dogecoin",
                unit: "DOGE",
                decimals: 8,
                hd_coin_type: 3,
                balance_scheme: BalanceScheme::Utxo,
                transaction_scheme: TransactionScheme::InputsOutputs,
                key_format: KeyFormat::Utxo(UtxoNetworkParams {
                    p2pkh: 0x1e,
                    p2sh: 0x16,
                    wif: 0x9e,
                    bech32_hrp: None,
                }),
                segwit: false,
                is_testnet: false,
                chain_id: None,
                fee: FeeDefaults::PerByte(sat_tiers(1000, 1000, 2000, 5000)),
            },
            Coin::Ethereum => CoinDescriptor {
                coin: self,
                name: "Ethereum",
                unit: "ETH",
                decimals: 18,
                hd_coin_type: 60,
                balance_scheme: BalanceScheme::Account,
                transaction_scheme: TransactionScheme::FromTo,
                key_format: KeyFormat::Account,
                segwit: false,
                is_testnet: false,
                chain_id: Some(1),
                fee: FeeDefaults::Gas {
                    prices: gas_tiers(),
                    min_gas_limit: 21_000,
                },
            },
            Coin::EthereumSepolia => CoinDescriptor {
                coin: self,
                name: "Ethereum Sepolia",
                unit: "SepoliaETH",
                decimals: 18,
                hd_coin_type: 60,
                balance_scheme: BalanceScheme::Account,
                transaction_scheme: TransactionScheme::FromTo,
                key_format: KeyFormat::Account,
                segwit: false,
                is_testnet: true,
                chain_id: Some(11_155_111),
                fee: FeeDefaults::Gas {
                    prices: gas_tiers(),
                    min_gas_limit: 21_000,
                },
            },
        }
    }

    /// 按单位符号查找（不区分大小写）
    pub fn from_symbol(symbol: &str) -> Option<Coin> {
        Coin::all()
            .iter()
            .copied()
            .find(|c| c.descriptor().unit.eq_ignore_ascii_case(symbol.trim()))
    }

    pub fn balance_scheme(self) -> BalanceScheme {
        self.descriptor().balance_scheme
    }

    pub fn transaction_scheme(self) -> TransactionScheme {
        self.descriptor().transaction_scheme
    }

    pub fn hd_coin_type(self) -> u32 {
        self.descriptor().hd_coin_type
    }

    pub fn key_format(self) -> KeyFormat {
        self.descriptor().key_format
    }

    pub fn decimals(self) -> u32 {
        self.descriptor().decimals
    }

    pub fn unit(self) -> &'static str {
        self.descriptor().unit
    }

    pub fn min_value(self) -> Decimal {
        self.descriptor().min_value()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().unit)
    }
}

impl CoinDescriptor {
    /// 最小单位（1 satoshi / 1 wei）
    pub fn min_value(&self) -> Decimal {
        Decimal::new(1, self.decimals)
    }

    /// UTXO 币种默认费率 (satoshi/byte)
    pub fn default_fee_rate(&self) -> Option<u64> {
        match self.fee {
            FeeDefaults::PerByte(tiers) => Some(tiers.default),
            FeeDefaults::Gas { .. } => None,
        }
    }

    /// 账户币种默认 gas 价格
    pub fn default_gas_price(&self) -> Option<Decimal> {
        match self.fee {
            FeeDefaults::Gas { prices, .. } => Some(prices.default),
            FeeDefaults::PerByte(_) => None,
        }
    }

    pub fn min_gas_limit(&self) -> Option<u64> {
        match self.fee {
            FeeDefaults::Gas { min_gas_limit, .. } => Some(min_gas_limit),
            FeeDefaults::PerByte(_) => None,
        }
    }

    /// 检查描述自身是否一致
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.is_empty() || self.unit.is_empty() {
            errors.push(format!("{:?} has empty name or unit", self.coin));
        }

        match (self.balance_scheme, self.transaction_scheme) {
            (BalanceScheme::Utxo, TransactionScheme::InputsOutputs)
            | (BalanceScheme::Account, TransactionScheme::FromTo) => {}
            (balance, tx) => errors.push(format!(
                "{} pairs {:?} balances with {:?} transactions",
                self.name, balance, tx
            )),
        }

        match (self.balance_scheme, &self.key_format, &self.fee) {
            (BalanceScheme::Utxo, KeyFormat::Utxo(params), FeeDefaults::PerByte(tiers)) => {
                if self.segwit && params.bech32_hrp.is_none() {
                    errors.push(format!("{} is segwit but has no bech32 prefix", self.name));
                }
                if !(tiers.floor <= tiers.low
                    && tiers.low <= tiers.default
                    && tiers.default <= tiers.high)
                {
                    errors.push(format!("{} fee tiers are not ordered", self.name));
                }
            }
            (
                BalanceScheme::Account,
                KeyFormat::Account,
                FeeDefaults::Gas {
                    prices,
                    min_gas_limit,
                },
            ) => {
                if !(prices.floor <= prices.low
                    && prices.low <= prices.default
                    && prices.default <= prices.high)
                {
                    errors.push(format!("{} gas price tiers are not ordered", self.name));
                }
                if *min_gas_limit == 0 {
                    errors.push(format!("{} has zero min gas limit", self.name));
                }
                if self.chain_id.is_none() {
                    errors.push(format!("{} has no chain id", self.name));
                }
            }
            _ => errors.push(format!(
                "{} key format or fee defaults do not match its balance scheme",
                self.name
            )),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 校验所有内置币种
pub fn validate_all() -> Result<(), Vec<String>> {
    let errors: Vec<String> = Coin::all()
        .iter()
        .filter_map(|c| c.descriptor().validate().err())
        .flatten()
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
