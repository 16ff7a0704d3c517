//! HD 派生
//!
//! 路径 purpose'/coin_type'/account'/change/index，
//! purpose 由钱包地址格式决定（44 / 49 / 84）。
//! 账户级节点按硬化前缀缓存，地址级派生不缓存。

use std::{collections::HashMap, fmt, str::FromStr, sync::Mutex};

use bip39::{Language, Mnemonic};
use coins_bip32::{path::DerivationPath, prelude::*};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{
    address::{Address, AddressFormat, PrivateKey},
    coin::Coin,
};
use crate::error::{Result, WalletError};

const HARDENED: u32 = 0x8000_0000;

/// 派生类型（外部收款 / 内部找零）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerivationType {
    Receive,
    Change,
}

impl DerivationType {
    pub const ALL: [DerivationType; 2] = [DerivationType::Receive, DerivationType::Change];

    /// 路径中的 change 分量
    pub fn change_index(self) -> u32 {
        match self {
            DerivationType::Receive => 0,
            DerivationType::Change => 1,
        }
    }
}

impl fmt::Display for DerivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationType::Receive => f.write_str("RECEIVE"),
            DerivationType::Change => f.write_str("CHANGE"),
        }
    }
}

/// 完整派生路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdPath {
    pub purpose: u32,
    pub coin_type: u32,
    pub account: u32,
    pub derivation_type: DerivationType,
    pub index: u32,
}

impl HdPath {
    pub fn new(
        coin: Coin,
        format: AddressFormat,
        account: u32,
        derivation_type: DerivationType,
        index: u32,
    ) -> Self {
        Self {
            purpose: format.purpose(),
            coin_type: coin.hd_coin_type(),
            account,
            derivation_type,
            index,
        }
    }

    /// 硬化的账户级前缀，作为节点缓存键
    pub fn account_prefix(&self) -> String {
        format!("m/{}'/{}'/{}'", self.purpose, self.coin_type, self.account)
    }
}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.account_prefix(),
            self.derivation_type.change_index(),
            self.index
        )
    }
}

impl FromStr for HdPath {
    type Err = WalletError;

    /// 只接受 m/purpose'/coin'/account'/change/index 五段式
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |msg: &str| WalletError::Derivation(format!("{}: {}", msg, s));

        let rest = s
            .strip_prefix("m/")
            .ok_or_else(|| invalid("path must start with 'm/'"))?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 5 {
            return Err(invalid("path must have 5 components"));
        }

        let hardened = |p: &str| -> Result<u32> {
            let n = p
                .strip_suffix('\'')
                .ok_or_else(|| invalid("purpose, coin type and account must be hardened"))?;
            n.parse::<u32>()
                .ok()
                .filter(|v| *v < HARDENED)
                .ok_or_else(|| invalid("invalid hardened component"))
        };
        let normal = |p: &str| -> Result<u32> {
            p.parse::<u32>()
                .ok()
                .filter(|v| *v < HARDENED)
                .ok_or_else(|| invalid("change and index must be non-hardened"))
        };

        let purpose = hardened(parts[0])?;
        if !matches!(purpose, 44 | 49 | 84) {
            return Err(invalid("purpose must be 44, 49 or 84"));
        }

        let derivation_type = match normal(parts[3])? {
            0 => DerivationType::Receive,
            1 => DerivationType::Change,
            _ => return Err(invalid("change must be 0 or 1")),
        };

        Ok(Self {
            purpose,
            coin_type: hardened(parts[1])?,
            account: hardened(parts[2])?,
            derivation_type,
            index: normal(parts[4])?,
        })
    }
}

/// BIP39 种子
pub struct Seed(Zeroizing<Vec<u8>>);

impl Seed {
    /// 从英文助记词生成种子（可选密码）
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| WalletError::Derivation(format!("invalid mnemonic: {}", e)))?;
        Ok(Self(Zeroizing::new(mnemonic.to_seed(passphrase).to_vec())))
    }

    /// BIP32 允许 16..=64 字节
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !(16..=64).contains(&bytes.len()) {
            return Err(WalletError::Derivation(format!(
                "seed must be 16..=64 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Zeroizing::new(bytes.to_vec())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// 账户级节点缓存，键为硬化前缀
#[derive(Default)]
pub struct HdNodeCache {
    nodes: HashMap<String, XPriv>,
}

impl HdNodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// 取账户节点，未命中时从种子派生并缓存
    pub fn account_node(&mut self, seed: &Seed, prefix: &str) -> Result<XPriv> {
        if let Some(node) = self.nodes.get(prefix) {
            return Ok(node.clone());
        }

        let derivation_path = prefix
            .parse::<DerivationPath>()
            .map_err(|e| WalletError::Derivation(format!("invalid path {}: {}", prefix, e)))?;

        let master_key = XPriv::root_from_seed(seed.as_bytes(), None)
            .map_err(|e| WalletError::Derivation(e.to_string()))?;

        let node = master_key
            .derive_path(&derivation_path)
            .map_err(|e| WalletError::Derivation(e.to_string()))?;

        tracing::debug!(prefix, "cached account node");
        self.nodes.insert(prefix.to_string(), node.clone());
        Ok(node)
    }
}

impl fmt::Debug for HdNodeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdNodeCache")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

/// 一次签名会话：种子 + 节点缓存
///
/// 派生是同步的，锁只在单次派生内持有
#[derive(Debug)]
pub struct HdSession {
    seed: Seed,
    cache: Mutex<HdNodeCache>,
}

impl HdSession {
    pub fn new(seed: Seed) -> Self {
        Self {
            seed,
            cache: Mutex::new(HdNodeCache::new()),
        }
    }

    pub fn derive_private_key(&self, coin: Coin, path: &HdPath) -> Result<PrivateKey> {
        let account_node = {
            let mut cache = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cache.account_node(&self.seed, &path.account_prefix())?
        };

        let leaf = account_node
            .derive_child(path.derivation_type.change_index())
            .and_then(|change| change.derive_child(path.index))
            .map_err(|e| WalletError::Derivation(format!("{}: {}", path, e)))?;

        // XPriv 实现 AsRef<SigningKey>
        let signing_key: &SigningKey = leaf.as_ref();
        let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes().into());

        Ok(PrivateKey::from_bytes(coin, *bytes)?)
    }

    pub fn derive_address(
        &self,
        coin: Coin,
        format: AddressFormat,
        path: &HdPath,
    ) -> Result<Address> {
        let key = self.derive_private_key(coin, path)?;
        Ok(key.public_key()?.to_address(format)?)
    }

    pub fn cached_nodes(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
