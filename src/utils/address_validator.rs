//! 地址验证模块
//!
//! 统一入口：按币种解析地址；另含 EIP-55 校验和工具

use sha3::{Digest, Keccak256};

use crate::domain::{address::Address, coin::Coin};

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 地址是否属于该币种（网络参数必须完全匹配）
    pub fn validate(coin: Coin, address: &str) -> bool {
        Address::parse(coin, address).is_ok()
    }

    /// 在所有内置币种中找出能解析该地址的币种
    pub fn detect(address: &str) -> Vec<Coin> {
        Coin::all()
            .iter()
            .copied()
            .filter(|c| Self::validate(*c, address))
            .collect()
    }
}

/// EIP-55 混合大小写校验和
/// https://eips.ethereum.org/EIPS/eip-55
pub fn to_checksum_address(bytes: &[u8]) -> String {
    let addr_lower = hex::encode(bytes);
    let hash = Keccak256::digest(addr_lower.as_bytes());

    let mut out = String::with_capacity(2 + addr_lower.len());
    out.push_str("0x");
    for (i, ch) in addr_lower.chars().enumerate() {
        let hash_byte = hash[i / 2];
        let hash_nibble = if i % 2 == 0 {
            hash_byte >> 4
        } else {
            hash_byte & 0x0f
        };

        if ch.is_ascii_alphabetic() && hash_nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// 校验 40 位十六进制部分（不含 0x）的 EIP-55 大小写
pub fn verify_eip55_checksum(hex_part: &str) -> bool {
    let addr_lower = hex_part.to_lowercase();
    let hash = Keccak256::digest(addr_lower.as_bytes());

    for (i, ch) in hex_part.chars().enumerate() {
        if ch.is_alphabetic() {
            let hash_byte = hash[i / 2];
            let hash_nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };

            let should_be_uppercase = hash_nibble >= 8;
            if ch.is_uppercase() != should_be_uppercase {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eip55_reference_vectors() {
        // EIP-55 规范中的示例
        let vectors = [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ];

        for v in vectors {
            let bytes = hex::decode(&v[2..]).unwrap();
            assert_eq!(to_checksum_address(&bytes), v);
            assert!(verify_eip55_checksum(&v[2..]));
        }
    }

    #[test]
    fn test_bad_checksum_detected() {
        assert!(!verify_eip55_checksum(
            "5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
    }

    #[test]
    fn test_validate_by_coin() {
        assert!(AddressValidator::validate(
            Coin::Bitcoin,
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        ));
        assert!(!AddressValidator::validate(
            Coin::BitcoinTestnet,
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        ));
        assert!(AddressValidator::validate(
            Coin::Ethereum,
            "0x742d35cc6634c0532925a3b844bc9e7595f0beb0"
        ));
    }

    #[test]
    fn test_detect_evm_address_matches_both_networks() {
        let coins = AddressValidator::detect("0x742d35cc6634c0532925a3b844bc9e7595f0beb0");
        assert_eq!(coins, vec![Coin::Ethereum, Coin::EthereumSepolia]);
    }
}
