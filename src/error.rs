//! 错误类型
//!
//! 统一的钱包核心错误分类：校验错误、余额不足、余额查询、网络、不支持的脚本/方案

use rust_decimal::Decimal;
use thiserror::Error;

/// 地址解析错误（标明具体不匹配的网络参数）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid base58check encoding: {0}")]
    Base58(String),

    #[error("invalid bech32 encoding: {0}")]
    Bech32(String),

    #[error("version byte mismatch: expected one of {expected:02x?}, found {found:#04x}")]
    VersionByte { expected: Vec<u8>, found: u8 },

    #[error("bech32 prefix mismatch: expected {expected:?}, found {found:?}")]
    Bech32Prefix {
        expected: Option<String>,
        found: String,
    },

    #[error("unsupported witness version {0}")]
    WitnessVersion(u8),

    #[error("invalid payload length {0}")]
    Length(usize),

    #[error("invalid hex address: {0}")]
    Hex(String),

    #[error("EIP-55 checksum mismatch")]
    Checksum,

    #[error("address format {format} is not supported by {coin}")]
    UnsupportedFormat { coin: String, format: String },
}

/// 公钥/私钥解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid WIF encoding: {0}")]
    Wif(String),

    #[error("WIF version mismatch: expected {expected:#04x}, found {found:#04x}")]
    WifVersion { expected: u8, found: u8 },

    #[error("uncompressed WIF keys are not supported")]
    Uncompressed,

    #[error("invalid public key: {0}")]
    PublicKey(String),

    #[error("invalid private key: {0}")]
    PrivateKey(String),
}

/// 金额校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid amount: {0}")]
    Parse(String),

    #[error("amount must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("amount {value} has more than {max} decimal places")]
    TooManyDecimals { value: Decimal, max: u32 },

    #[error("amount {0} overflows the base unit range")]
    Overflow(Decimal),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transaction {txid} is for {found}, wallet coin is {expected}")]
    CoinMismatch {
        txid: String,
        expected: String,
        found: String,
    },

    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("no balance tracked for transaction {0}")]
    BalanceLookup(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported script type: {0}")]
    UnsupportedScript(String),

    #[error("operation not supported: {0}")]
    UnsupportedScheme(String),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WalletError>;

impl WalletError {
    /// 稳定的错误码（供上层展示/映射）
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Address(_) => "invalid_address",
            WalletError::Key(_) => "invalid_key",
            WalletError::Amount(_) => "invalid_amount",
            WalletError::Validation(_) => "validation_failed",
            WalletError::CoinMismatch { .. } => "coin_mismatch",
            WalletError::InsufficientFunds { .. } => "insufficient_funds",
            WalletError::BalanceLookup(_) => "balance_lookup",
            WalletError::Network(_) => "network",
            WalletError::UnsupportedScript(_) => "unsupported_script",
            WalletError::UnsupportedScheme(_) => "unsupported_scheme",
            WalletError::Derivation(_) => "derivation_failed",
            WalletError::Precondition(_) => "precondition_failed",
            WalletError::Config(_) => "config",
        }
    }

    /// 是否属于输入校验类错误
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::Address(_)
                | WalletError::Key(_)
                | WalletError::Amount(_)
                | WalletError::Validation(_)
                | WalletError::CoinMismatch { .. }
        )
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, WalletError::InsufficientFunds { .. })
    }

    /// 只有网络错误允许调用方重试；脚本/方案不支持和前置条件失败是致命的
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Network(_))
    }

    pub fn network(msg: impl Into<String>) -> Self {
        WalletError::Network(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        WalletError::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        WalletError::Precondition(msg.into())
    }
}
