//! 地址/密钥格式：各币种往返与跨网络拒绝

use walletcore::{
    domain::{Address, AddressFormat, Coin, PrivateKey, PublicKey},
    error::AddressError,
    utils::AddressValidator,
};

fn key_one(coin: Coin) -> PrivateKey {
    let mut bytes = [0u8; 32];
    bytes[31] = 1;
    PrivateKey::from_bytes(coin, bytes).unwrap()
}

#[test]
fn test_address_round_trip_on_every_coin() {
    for &coin in Coin::all() {
        let public = key_one(coin).public_key().unwrap();
        for format in coin.key_format().supported_formats() {
            let address = public.to_address(format).unwrap();
            let rendered = address.to_string();
            let parsed = Address::parse(coin, &rendered).unwrap();

            assert_eq!(parsed, address, "{coin} {format}");
            assert_eq!(parsed.format(), format);
            assert_eq!(parsed.to_string(), rendered);
            assert!(AddressValidator::validate(coin, &rendered), "{coin} {rendered}");
        }
    }
}

#[test]
fn test_known_vectors() {
    let btc = key_one(Coin::Bitcoin).public_key().unwrap();
    assert_eq!(
        btc.to_address(AddressFormat::P2pkh).unwrap().to_string(),
        "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
    );
    assert_eq!(
        btc.to_address(AddressFormat::Bech32).unwrap().to_string(),
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
    );

    let eth = key_one(Coin::Ethereum).public_key().unwrap();
    assert_eq!(
        eth.to_address(AddressFormat::Account).unwrap().to_string(),
        "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
    );
}

#[test]
fn test_mainnet_address_rejected_by_testnet() {
    let err = Address::parse(Coin::BitcoinTestnet, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap_err();
    assert!(matches!(err, AddressError::VersionByte { found: 0x00, .. }));

    let err = Address::parse(
        Coin::BitcoinTestnet,
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
    )
    .unwrap_err();
    assert!(matches!(err, AddressError::Bech32Prefix { .. } | AddressError::Base58(_)));
}

#[test]
fn test_litecoin_rejects_bitcoin_address() {
    assert!(Address::parse(Coin::Litecoin, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").is_err());
    assert!(!AddressValidator::validate(
        Coin::Litecoin,
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
    ));
}

#[test]
fn test_p2wsh_accepted_on_parse() {
    let address = Address::parse(
        Coin::Bitcoin,
        "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3",
    )
    .unwrap();
    assert_eq!(address.format(), AddressFormat::Bech32);
    assert_eq!(address.payload().len(), 32);
}

#[test]
fn test_account_address_case_rules() {
    let lower = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
    let parsed = Address::parse(Coin::Ethereum, lower).unwrap();
    assert_eq!(parsed.to_string(), lower);
    // 同一账户，与校验和形式相等
    let checksummed =
        Address::parse(Coin::Ethereum, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap();
    assert_eq!(checksummed.to_string(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    assert_eq!(parsed, checksummed);

    assert!(Address::parse(Coin::Ethereum, "0x7E5F4552091A69125d5DfCb7b8C2659029395BDF").is_err());
    assert!(Address::parse(Coin::Ethereum, "7e5f4552091a69125d5dfcb7b8c2659029395bdf").is_err());
    assert!(Address::parse(Coin::Ethereum, "0x7e5f").is_err());
}

#[test]
fn test_private_key_round_trip() {
    for &coin in Coin::all() {
        let key = key_one(coin);
        let rendered = coin.key_format().render_private_key(&key);
        let parsed = coin.key_format().parse_private_key(coin, &rendered).unwrap();
        assert_eq!(parsed.secret_bytes(), key.secret_bytes(), "{coin}");
    }
}

#[test]
fn test_public_key_round_trip() {
    for &coin in Coin::all() {
        let key = key_one(coin).public_key().unwrap();
        let rendered = coin.key_format().render_public_key(&key);
        let parsed = PublicKey::parse(coin, &rendered).unwrap();
        assert_eq!(parsed, key, "{coin}");
    }
}

#[test]
fn test_detect_candidates() {
    let coins = AddressValidator::detect("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    assert_eq!(coins, vec![Coin::Bitcoin]);

    let coins = AddressValidator::detect("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    assert!(coins.contains(&Coin::Ethereum));
    assert!(coins.contains(&Coin::EthereumSepolia));
}

#[test]
fn test_parsed_address_renders_input_unchanged() {
    let inputs = [
        (Coin::Bitcoin, "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"),
        (Coin::Bitcoin, "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
        (Coin::Bitcoin, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"),
        (Coin::Bitcoin, "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4"),
        (Coin::Ethereum, "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"),
        (Coin::Ethereum, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"),
        (Coin::EthereumSepolia, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
    ];
    for (coin, input) in inputs {
        let address = Address::parse(coin, input).unwrap();
        assert_eq!(address.to_string(), input, "{} {}", coin, input);
    }

    let upper = Address::parse(Coin::Bitcoin, "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4").unwrap();
    let lower = Address::parse(Coin::Bitcoin, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap();
    assert_eq!(upper, lower);
    assert_eq!(upper.script_pubkey().unwrap(), lower.script_pubkey().unwrap());
}
