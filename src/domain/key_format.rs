//! 密钥格式策略
//!
//! 每个币种族一个变体：UTXO 族（Base58Check / Bech32 / WIF）与账户族（EIP-55 十六进制）

use std::fmt;

use bech32::{segwit, Hrp};
use bitcoin::hashes::{hash160, Hash};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use super::{
    address::{Address, AddressCase, AddressFormat, PrivateKey, PublicKey},
    coin::Coin,
};
use crate::{
    error::{AddressError, KeyError},
    utils::address_validator::{to_checksum_address, verify_eip55_checksum},
};

/// UTXO 网络参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoNetworkParams {
    pub p2pkh: u8,
    pub p2sh: u8,
    pub wif: u8,
    /// 无 SegWit 的链为 None
    pub bech32_hrp: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Utxo(UtxoNetworkParams),
    Account,
}

fn hash160(bytes: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(bytes).to_byte_array()
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

impl KeyFormat {
    /// 该族支持派生的地址格式
    pub fn supported_formats(&self) -> Vec<AddressFormat> {
        match self {
            KeyFormat::Utxo(p) if p.bech32_hrp.is_some() => vec![
                AddressFormat::P2pkh,
                AddressFormat::P2sh,
                AddressFormat::Bech32,
            ],
            KeyFormat::Utxo(_) => vec![AddressFormat::P2pkh],
            KeyFormat::Account => vec![AddressFormat::Account],
        }
    }

    pub fn parse_address(&self, coin: Coin, s: &str) -> Result<Address, AddressError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        match self {
            KeyFormat::Utxo(params) => parse_utxo_address(coin, params, s),
            KeyFormat::Account => parse_account_address(coin, s),
        }
    }

    pub fn render_address(&self, address: &Address) -> String {
        address.to_string()
    }

    pub(crate) fn write_address<W: fmt::Write>(&self, w: &mut W, address: &Address) -> fmt::Result {
        match (self, address.format()) {
            (KeyFormat::Utxo(p), AddressFormat::P2pkh) => {
                w.write_str(&base58_with_version(p.p2pkh, address.payload()))
            }
            (KeyFormat::Utxo(p), AddressFormat::P2sh) => {
                w.write_str(&base58_with_version(p.p2sh, address.payload()))
            }
            (KeyFormat::Utxo(p), AddressFormat::Bech32) => {
                // 构造时已保证前缀存在且程序长度合法
                let hrp = Hrp::parse_unchecked(p.bech32_hrp.unwrap_or_default());
                let program = address.payload();
                match address.case() {
                    AddressCase::Upper => {
                        segwit::encode_upper_to_fmt_unchecked(w, hrp, segwit::VERSION_0, program)
                    }
                    _ => segwit::encode_lower_to_fmt_unchecked(w, hrp, segwit::VERSION_0, program),
                }
            }
            (KeyFormat::Account, _) | (KeyFormat::Utxo(_), AddressFormat::Account) => {
                match address.case() {
                    AddressCase::Lower => write!(w, "0x{}", hex::encode(address.payload())),
                    _ => w.write_str(&to_checksum_address(address.payload())),
                }
            }
        }
    }

    pub fn parse_public_key(&self, coin: Coin, s: &str) -> Result<PublicKey, KeyError> {
        let bytes = hex::decode(strip_hex_prefix(s.trim()))
            .map_err(|e| KeyError::PublicKey(e.to_string()))?;

        match (self, bytes.len()) {
            (KeyFormat::Utxo(_), 33) | (KeyFormat::Account, 33 | 65) => {
                PublicKey::from_sec1(coin, &bytes)
            }
            (_, len) => Err(KeyError::PublicKey(format!("unexpected length {}", len))),
        }
    }

    /// UTXO：压缩 SEC1 十六进制；账户：0x + 未压缩 SEC1
    pub fn render_public_key(&self, key: &PublicKey) -> String {
        match self {
            KeyFormat::Utxo(_) => hex::encode(key.compressed()),
            KeyFormat::Account => match key.uncompressed() {
                Ok(bytes) => format!("0x{}", hex::encode(bytes)),
                Err(_) => format!("0x{}", hex::encode(key.compressed())),
            },
        }
    }

    pub fn parse_private_key(&self, coin: Coin, s: &str) -> Result<PrivateKey, KeyError> {
        match self {
            KeyFormat::Utxo(params) => parse_wif(coin, params, s.trim()),
            KeyFormat::Account => {
                let bytes = Zeroizing::new(
                    hex::decode(strip_hex_prefix(s.trim()))
                        .map_err(|e| KeyError::PrivateKey(e.to_string()))?,
                );
                let raw: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KeyError::PrivateKey(format!("expected 32 bytes, got {}", bytes.len())))?;
                PrivateKey::from_bytes(coin, raw)
            }
        }
    }

    pub fn render_private_key(&self, key: &PrivateKey) -> String {
        match self {
            KeyFormat::Utxo(params) => {
                let mut data = Zeroizing::new(Vec::with_capacity(34));
                data.push(params.wif);
                data.extend_from_slice(key.secret_bytes());
                data.push(0x01);
                bs58::encode(data.as_slice()).with_check().into_string()
            }
            KeyFormat::Account => format!("0x{}", hex::encode(key.secret_bytes())),
        }
    }

    pub fn public_key_to_address(
        &self,
        key: &PublicKey,
        format: AddressFormat,
    ) -> Result<Address, AddressError> {
        let coin = key.coin();
        let unsupported = || AddressError::UnsupportedFormat {
            coin: coin.to_string(),
            format: format.to_string(),
        };

        match (self, format) {
            (KeyFormat::Utxo(_), AddressFormat::P2pkh) => Ok(Address::from_parts(
                coin,
                format,
                hash160(key.compressed()).to_vec(),
            )),
            (KeyFormat::Utxo(p), AddressFormat::P2sh) if p.bech32_hrp.is_some() => {
                // P2SH-P2WPKH：redeem = OP_0 PUSH20 <hash160(pubkey)>
                let mut redeem = vec![0x00, 0x14];
                redeem.extend_from_slice(&hash160(key.compressed()));
                Ok(Address::from_parts(coin, format, hash160(&redeem).to_vec()))
            }
            (KeyFormat::Utxo(p), AddressFormat::Bech32) if p.bech32_hrp.is_some() => Ok(
                Address::from_parts(coin, format, hash160(key.compressed()).to_vec()),
            ),
            (KeyFormat::Account, AddressFormat::Account) => {
                let uncompressed = key
                    .uncompressed()
                    .map_err(|e| AddressError::Hex(e.to_string()))?;
                let hash = Keccak256::digest(&uncompressed[1..]);
                Ok(Address::from_parts(coin, format, hash[12..].to_vec()))
            }
            _ => Err(unsupported()),
        }
    }
}

fn base58_with_version(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

fn parse_utxo_address(
    coin: Coin,
    params: &UtxoNetworkParams,
    s: &str,
) -> Result<Address, AddressError> {
    match segwit::decode(s) {
        Ok((hrp, version, program)) => {
            let found = hrp.to_lowercase();
            if params.bech32_hrp != Some(found.as_str()) {
                return Err(AddressError::Bech32Prefix {
                    expected: params.bech32_hrp.map(str::to_string),
                    found,
                });
            }
            if version != segwit::VERSION_0 {
                return Err(AddressError::WitnessVersion(version.to_u8()));
            }
            if program.len() != 20 && program.len() != 32 {
                return Err(AddressError::Length(program.len()));
            }
            // 混合大小写已被解码拒绝
            let case = if s.chars().any(|c| c.is_ascii_uppercase()) {
                AddressCase::Upper
            } else {
                AddressCase::Canonical
            };
            return Ok(Address::from_parts(coin, AddressFormat::Bech32, program).with_case(case));
        }
        Err(e) => {
            // 看起来像本网络的 bech32 地址时，报告 bech32 的错误
            if let Some(hrp) = params.bech32_hrp {
                if s.to_lowercase().starts_with(&format!("{}1", hrp)) {
                    return Err(AddressError::Bech32(e.to_string()));
                }
            }
        }
    }

    let data = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;

    if data.len() != 21 {
        return Err(AddressError::Length(data.len()));
    }

    let format = if data[0] == params.p2pkh {
        AddressFormat::P2pkh
    } else if data[0] == params.p2sh {
        AddressFormat::P2sh
    } else {
        return Err(AddressError::VersionByte {
            expected: vec![params.p2pkh, params.p2sh],
            found: data[0],
        });
    };

    Ok(Address::from_parts(coin, format, data[1..].to_vec()))
}

fn parse_account_address(coin: Coin, s: &str) -> Result<Address, AddressError> {
    let hex_part = s
        .strip_prefix("0x")
        .ok_or_else(|| AddressError::Hex("missing 0x prefix".into()))?;

    if hex_part.len() != 40 {
        return Err(AddressError::Length(hex_part.len() / 2));
    }

    let payload = hex::decode(hex_part).map_err(|e| AddressError::Hex(e.to_string()))?;

    // 含大写字母时必须满足 EIP-55
    let case = if hex_part.chars().any(|c| c.is_ascii_uppercase()) {
        if !verify_eip55_checksum(hex_part) {
            return Err(AddressError::Checksum);
        }
        AddressCase::Canonical
    } else {
        AddressCase::Lower
    };

    Ok(Address::from_parts(coin, AddressFormat::Account, payload).with_case(case))
}

fn parse_wif(coin: Coin, params: &UtxoNetworkParams, s: &str) -> Result<PrivateKey, KeyError> {
    let data = Zeroizing::new(
        bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| KeyError::Wif(e.to_string()))?,
    );

    match data.len() {
        34 if data[33] == 0x01 => {}
        33 => return Err(KeyError::Uncompressed),
        len => return Err(KeyError::Wif(format!("unexpected length {}", len))),
    }

    if data[0] != params.wif {
        return Err(KeyError::WifVersion {
            expected: params.wif,
            found: data[0],
        });
    }

    let mut raw = [0u8; 32];
    raw.copy_from_slice(&data[1..33]);
    let key = PrivateKey::from_bytes(coin, raw);
    zeroize::Zeroize::zeroize(&mut raw);
    key
}
