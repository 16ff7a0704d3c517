//! 账户钱包端到端：gas 费、余额检查、EIP-155 签名、本地 nonce

mod common;

use std::sync::Arc;

use common::*;
use rust_decimal::Decimal;
use walletcore::{
    domain::Coin,
    service::{FeeOptions, FeeRecord, FeeTier, SignedPayload, Wallet},
};

fn eth_wallet(network: Arc<MockNetwork>) -> Wallet {
    Wallet::builder(Coin::Ethereum)
        .build(seed(), network)
        .unwrap()
}

/// 外部地址转入 1 ETH（已确认、成功）
fn fund(wallet: &Wallet) {
    let address = wallet.receive_address().unwrap();
    assert_eq!(address.address, ETH_RECEIVE_0);
    wallet
        .wd()
        .transaction()
        .add(eth_tx(
            "0xfund",
            ETH_EXTERNAL,
            &address.address,
            Decimal::ONE,
            7,
            Some(21_000),
            Some(true),
            Some(10),
        ))
        .unwrap();
}

fn gas_options(price: Decimal) -> FeeOptions {
    FeeOptions::Gas {
        gas_price: price,
        gas_limit: None,
    }
}

#[tokio::test]
async fn test_fee_is_gas_limit_times_price() {
    let network = Arc::new(MockNetwork::new());
    let wallet = eth_wallet(network.clone());
    fund(&wallet);
    let options = gas_options(gwei(20));
    let half = Decimal::new(5, 1);

    // 估算失败：协议最小值
    let fee = wallet
        .calculate_fee(half, &options, Some(ETH_EXTERNAL))
        .await
        .unwrap();
    assert_eq!(fee, Decimal::new(42, 5));

    // 估算高于最小值时采用估算
    network.set_gas_estimate(30_000);
    let fee = wallet
        .calculate_fee(half, &options, Some(ETH_EXTERNAL))
        .await
        .unwrap();
    assert_eq!(fee, Decimal::new(6, 4));

    // 不会低于最小值
    network.set_gas_estimate(5_000);
    let fee = wallet
        .calculate_fee(half, &options, Some(ETH_EXTERNAL))
        .await
        .unwrap();
    assert_eq!(fee, Decimal::new(42, 5));
}

#[tokio::test]
async fn test_send_half() {
    init_test_logging();
    let network = Arc::new(MockNetwork::new());
    let wallet = eth_wallet(network.clone());
    fund(&wallet);

    let tx = wallet
        .send(ETH_EXTERNAL, Decimal::new(5, 1), &gas_options(gwei(20)))
        .await
        .unwrap();

    assert_eq!(tx.fee, Decimal::new(42, 5));
    assert_eq!(tx.nonce, Some(0));
    assert!(tx.is_fully_signed());
    assert!(tx.raw_hex.starts_with("0x"));
    assert_eq!(tx.txid.len(), 66);
    assert_eq!(network.broadcasts(), vec![tx.raw_hex.clone()]);

    let SignedPayload::Account {
        tx: typed,
        signature: Some(signature),
    } = &tx.payload
    else {
        panic!("expected signed account payload");
    };
    // EIP-155: v = chain_id * 2 + 35/36
    assert!(signature.v == 37 || signature.v == 38);
    let signer = signature.recover(typed.sighash()).unwrap();
    assert_eq!(
        format!("{:?}", signer),
        ETH_RECEIVE_0.to_lowercase()
    );

    // 未确认支出按 gas_limit 计费
    let balance = wallet.balance();
    let ours = balance.address(ETH_RECEIVE_0).unwrap();
    assert_eq!(ours.spend, Decimal::new(5, 1) + Decimal::new(42, 5));
    assert_eq!(balance.confirmed_spendable(), Decimal::new(49958, 5));

    // 下一笔的本地 nonce 递增
    let next = wallet
        .create_transaction(ETH_EXTERNAL, Decimal::new(1, 1), &gas_options(gwei(20)))
        .await
        .unwrap();
    assert_eq!(next.nonce, Some(1));
}

#[tokio::test]
async fn test_insufficient_when_gas_plus_value_exceeds_balance() {
    let wallet = eth_wallet(Arc::new(MockNetwork::new()));
    fund(&wallet);

    let err = wallet
        .create_transaction(ETH_EXTERNAL, Decimal::ONE, &gas_options(gwei(20)))
        .await
        .unwrap_err();
    match err {
        walletcore::WalletError::InsufficientFunds { needed, available } => {
            assert_eq!(needed, Decimal::new(100042, 5));
            assert_eq!(available, Decimal::ONE);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_max_amount() {
    let wallet = eth_wallet(Arc::new(MockNetwork::new()));
    fund(&wallet);

    let max = wallet
        .max_amount(&gas_options(gwei(20)), Some(ETH_EXTERNAL))
        .await
        .unwrap();
    assert_eq!(max, Decimal::new(99958, 5));
}

#[tokio::test]
async fn test_max_amount_on_empty_wallet_is_insufficient() {
    let wallet = eth_wallet(Arc::new(MockNetwork::new()));
    wallet.receive_address().unwrap();

    let err = wallet
        .max_amount(&gas_options(gwei(20)), None)
        .await
        .unwrap_err();
    assert!(err.is_insufficient_funds());
}

#[tokio::test]
async fn test_unconfirmed_receive_not_spendable() {
    let wallet = eth_wallet(Arc::new(MockNetwork::new()));
    let address = wallet.receive_address().unwrap();
    wallet
        .wd()
        .transaction()
        .add(eth_tx(
            "0xpending",
            ETH_EXTERNAL,
            &address.address,
            Decimal::ONE,
            0,
            None,
            None,
            None,
        ))
        .unwrap();

    assert_eq!(wallet.balance().total(), Decimal::ONE);
    let err = wallet
        .create_transaction(ETH_EXTERNAL, Decimal::new(1, 1), &gas_options(gwei(20)))
        .await
        .unwrap_err();
    assert!(err.is_insufficient_funds());
}

#[tokio::test]
async fn test_gas_price_tiers() {
    let network = Arc::new(MockNetwork::new());
    let wallet = eth_wallet(network.clone());

    network.set_gas_price(gwei(30));
    let record = wallet.fee_record().await;
    assert_eq!(
        record,
        FeeRecord::Gas {
            low: gwei(30),
            medium: gwei(36),
            high: gwei(45),
        }
    );
    assert_eq!(
        wallet.fee_options(FeeTier::Medium, Some(&record)),
        gas_options(gwei(36))
    );
}

#[tokio::test]
async fn test_gas_price_below_floor_uses_static_prices() {
    let network = Arc::new(MockNetwork::new());
    let wallet = eth_wallet(network.clone());

    network.set_gas_price(Decimal::new(1, 12));
    assert_eq!(
        wallet.fee_record().await,
        FeeRecord::from_defaults(Coin::Ethereum)
    );
}

#[tokio::test]
async fn test_mixed_case_destination_checksum() {
    let wallet = eth_wallet(Arc::new(MockNetwork::new()));
    fund(&wallet);

    // 最后一位大小写被改动
    let bad = "0x7E5F4552091A69125d5DfCb7b8C2659029395BdF";
    let err = wallet
        .create_transaction(bad, Decimal::new(1, 1), &gas_options(gwei(20)))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    // 全小写不校验
    let lower = ETH_EXTERNAL.to_lowercase();
    assert!(wallet
        .create_transaction(&lower, Decimal::new(1, 1), &gas_options(gwei(20)))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_sepolia_uses_its_chain_id() {
    let wallet = Wallet::builder(Coin::EthereumSepolia)
        .build(seed(), Arc::new(MockNetwork::new()))
        .unwrap();
    let address = wallet.receive_address().unwrap();
    let mut funding = eth_tx(
        "0xfund",
        ETH_EXTERNAL,
        &address.address,
        Decimal::ONE,
        0,
        Some(21_000),
        Some(true),
        Some(1),
    );
    funding.coin = Coin::EthereumSepolia;
    wallet.wd().transaction().add(funding).unwrap();

    let tx = wallet
        .create_transaction(ETH_EXTERNAL, Decimal::new(1, 1), &gas_options(gwei(20)))
        .await
        .unwrap();
    let SignedPayload::Account {
        signature: Some(signature),
        ..
    } = &tx.payload
    else {
        panic!("expected signed account payload");
    };
    let chain_id = 11_155_111u64;
    assert!(signature.v == chain_id * 2 + 35 || signature.v == chain_id * 2 + 36);
}
