//! 地址与密钥模型
//!
//! 地址/公钥/私钥都是 "原始字节 + 格式标签 + 所属币种"，
//! 解析与渲染由币种的 `KeyFormat` 负责

use std::fmt;

use bitcoin::{
    opcodes::{
        all::{OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160},
        OP_0,
    },
    script::{Builder, PushBytesBuf},
    ScriptBuf,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::coin::Coin;
use crate::error::{AddressError, KeyError, WalletError};

/// 地址格式（显式声明，从不推断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressFormat {
    P2pkh,
    /// 从公钥派生时为 P2SH-P2WPKH
    P2sh,
    /// 原生隔离见证 v0
    Bech32,
    /// 账户模型唯一格式
    Account,
}

impl AddressFormat {
    /// BIP44/49/84 purpose
    pub fn purpose(self) -> u32 {
        match self {
            AddressFormat::P2pkh | AddressFormat::Account => 44,
            AddressFormat::P2sh => 49,
            AddressFormat::Bech32 => 84,
        }
    }
}

impl fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddressFormat::P2pkh => "P2PKH",
            AddressFormat::P2sh => "P2SH",
            AddressFormat::Bech32 => "BECH32",
            AddressFormat::Account => "ACCOUNT",
        };
        f.write_str(s)
    }
}

/// 解析时输入的大小写形式，渲染时原样还原
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AddressCase {
    /// bech32 小写，账户地址 EIP-55；派生地址总是这种形式
    #[default]
    Canonical,
    /// 全小写的账户地址
    Lower,
    /// 全大写的 bech32 地址
    Upper,
}

/// 地址
///
/// payload 含义随格式变化：P2PKH/P2SH 为 20 字节哈希，
/// BECH32 为见证程序（20 或 32 字节），ACCOUNT 为 20 字节账户地址。
/// 大小写只影响渲染，不参与相等比较。
#[derive(Clone)]
pub struct Address {
    coin: Coin,
    format: AddressFormat,
    payload: Vec<u8>,
    case: AddressCase,
}

impl Address {
    pub(crate) fn from_parts(coin: Coin, format: AddressFormat, payload: Vec<u8>) -> Self {
        Self {
            coin,
            format,
            payload,
            case: AddressCase::Canonical,
        }
    }

    pub(crate) fn with_case(mut self, case: AddressCase) -> Self {
        self.case = case;
        self
    }

    /// 按币种的网络参数解析地址字符串
    pub fn parse(coin: Coin, s: &str) -> Result<Self, AddressError> {
        coin.key_format().parse_address(coin, s)
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn case(&self) -> AddressCase {
        self.case
    }

    /// 输出锁定脚本（仅 UTXO 地址）
    pub fn script_pubkey(&self) -> Result<ScriptBuf, WalletError> {
        let len = self.payload.len();
        let script = match (self.format, len) {
            (AddressFormat::P2pkh, 20) => Builder::new()
                .push_opcode(OP_DUP)
                .push_opcode(OP_HASH160)
                .push_slice(push_bytes(&self.payload)?)
                .push_opcode(OP_EQUALVERIFY)
                .push_opcode(OP_CHECKSIG),
            (AddressFormat::P2sh, 20) => Builder::new()
                .push_opcode(OP_HASH160)
                .push_slice(push_bytes(&self.payload)?)
                .push_opcode(OP_EQUAL),
            // 见证 v0：OP_0 <program>
            (AddressFormat::Bech32, 20 | 32) => Builder::new()
                .push_opcode(OP_0)
                .push_slice(push_bytes(&self.payload)?),
            (AddressFormat::Account, _) => {
                return Err(WalletError::UnsupportedScheme(format!(
                    "{} addresses have no output script",
                    self.coin
                )))
            }
            _ => return Err(AddressError::Length(len).into()),
        };
        Ok(script.into_script())
    }
}

pub(crate) fn push_bytes(bytes: &[u8]) -> Result<PushBytesBuf, WalletError> {
    PushBytesBuf::try_from(bytes.to_vec())
        .map_err(|_| WalletError::from(AddressError::Length(bytes.len())))
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.coin == other.coin && self.format == other.format && self.payload == other.payload
    }
}

impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.coin.hash(state);
        self.format.hash(state);
        self.payload.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.coin.key_format().write_address(f, self)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}, {}, {})", self.coin, self.format, self)
    }
}

/// 公钥（内部统一保存 SEC1 压缩格式）
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    coin: Coin,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// 接受压缩或未压缩的 SEC1 编码
    pub fn from_sec1(coin: Coin, bytes: &[u8]) -> Result<Self, KeyError> {
        let key = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| KeyError::PublicKey(e.to_string()))?;
        Ok(Self {
            coin,
            bytes: key.to_encoded_point(true).as_bytes().to_vec(),
        })
    }

    pub fn parse(coin: Coin, s: &str) -> Result<Self, KeyError> {
        coin.key_format().parse_public_key(coin, s)
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    /// 33 字节压缩格式
    pub fn compressed(&self) -> &[u8] {
        &self.bytes
    }

    /// 65 字节未压缩格式
    pub fn uncompressed(&self) -> Result<Vec<u8>, KeyError> {
        let key = k256::PublicKey::from_sec1_bytes(&self.bytes)
            .map_err(|e| KeyError::PublicKey(e.to_string()))?;
        Ok(key.to_encoded_point(false).as_bytes().to_vec())
    }

    pub fn to_address(&self, format: AddressFormat) -> Result<Address, AddressError> {
        self.coin.key_format().public_key_to_address(self, format)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.coin.key_format().render_public_key(self))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {})", self.coin, hex::encode(&self.bytes))
    }
}

/// 私钥，离开作用域时清零
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    #[zeroize(skip)]
    coin: Coin,
    bytes: [u8; 32],
}

impl PrivateKey {
    pub fn from_bytes(coin: Coin, bytes: [u8; 32]) -> Result<Self, KeyError> {
        k256::SecretKey::from_slice(&bytes).map_err(|e| KeyError::PrivateKey(e.to_string()))?;
        Ok(Self { coin, bytes })
    }

    pub fn parse(coin: Coin, s: &str) -> Result<Self, KeyError> {
        coin.key_format().parse_private_key(coin, s)
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        let secret = k256::SecretKey::from_slice(&self.bytes)
            .map_err(|e| KeyError::PrivateKey(e.to_string()))?;
        Ok(PublicKey {
            coin: self.coin,
            bytes: secret
                .public_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        })
    }

    /// WIF（UTXO）或 0x 十六进制（账户）
    pub fn render(&self) -> String {
        self.coin.key_format().render_private_key(self)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, [REDACTED])", self.coin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_by_format() {
        assert_eq!(AddressFormat::P2pkh.purpose(), 44);
        assert_eq!(AddressFormat::P2sh.purpose(), 49);
        assert_eq!(AddressFormat::Bech32.purpose(), 84);
        assert_eq!(AddressFormat::Account.purpose(), 44);
    }

    #[test]
    fn test_script_pubkey_by_format() {
        let p2pkh = Address::parse(Coin::Bitcoin, "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").unwrap();
        assert!(p2pkh.script_pubkey().unwrap().is_p2pkh());

        let p2sh = Address::parse(Coin::Bitcoin, "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").unwrap();
        assert!(p2sh.script_pubkey().unwrap().is_p2sh());

        let wpkh = Address::parse(
            Coin::Bitcoin,
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        )
        .unwrap();
        assert!(wpkh.script_pubkey().unwrap().is_p2wpkh());
    }

    #[test]
    fn test_account_address_has_no_script() {
        let addr = Address::parse(
            Coin::Ethereum,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        )
        .unwrap();
        let err = addr.script_pubkey().unwrap_err();
        assert_eq!(err.code(), "unsupported_scheme");
    }

    #[test]
    fn test_case_does_not_affect_equality() {
        let lower =
            Address::parse(Coin::Ethereum, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let checksummed =
            Address::parse(Coin::Ethereum, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(lower.case(), AddressCase::Lower);
        assert_eq!(checksummed.case(), AddressCase::Canonical);
        assert_eq!(lower, checksummed);
        assert_ne!(lower.to_string(), checksummed.to_string());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::from_bytes(Coin::Bitcoin, [1u8; 32]).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("0101"));
    }

    #[test]
    fn test_zero_private_key_is_rejected() {
        assert!(PrivateKey::from_bytes(Coin::Ethereum, [0u8; 32]).is_err());
    }

    #[test]
    fn test_public_key_is_stored_compressed() {
        let key = PrivateKey::from_bytes(Coin::Ethereum, [7u8; 32]).unwrap();
        let public = key.public_key().unwrap();
        assert_eq!(public.compressed().len(), 33);
        assert_eq!(public.uncompressed().unwrap().len(), 65);

        let again = PublicKey::from_sec1(Coin::Ethereum, &public.uncompressed().unwrap()).unwrap();
        assert_eq!(again, public);
    }
}
