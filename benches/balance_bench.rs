//! 余额计算基准测试
//! 使用criterion测量大钱包的余额推导

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use walletcore::domain::{
    AccountTransfer, BalanceCalculator, Coin, DerivationType, ScriptType, TransactionDetail,
    UtxoInput, UtxoOutput, WalletAddress, WalletData, WalletDataPatch, WalletTransaction,
};

fn address(i: usize) -> WalletAddress {
    WalletAddress {
        address: format!("addr{i}"),
        derivation_type: DerivationType::Receive,
        index: i as u32,
        account: 0,
    }
}

/// 链式历史：每笔交易花掉上一笔的第一个输出
fn utxo_wallet(tx_count: usize) -> WalletData {
    let transactions = (0..tx_count)
        .map(|i| WalletTransaction {
            coin: Coin::Bitcoin,
            txid: format!("{i:064x}"),
            block_height: Some(i as u64),
            block_time: None,
            detail: TransactionDetail::InputsOutputs {
                inputs: vec![UtxoInput {
                    prev_txid: format!("{:064x}", i.saturating_sub(1)),
                    prev_index: 0,
                    sequence: u32::MAX,
                    sig_script: String::new(),
                    witness: vec![],
                }],
                outputs: vec![
                    UtxoOutput {
                        value: Decimal::new(100_000, 8),
                        addresses: vec![format!("addr{}", i % 50)],
                        script: String::new(),
                        script_type: ScriptType::P2wpkh,
                    },
                    UtxoOutput {
                        value: Decimal::new(5_000, 8),
                        addresses: vec![format!("addr{}", (i + 7) % 50)],
                        script: String::new(),
                        script_type: ScriptType::P2wpkh,
                    },
                ],
            },
        })
        .collect();

    WalletData::new(Coin::Bitcoin, 0).apply(&WalletDataPatch {
        addresses: (0..50).map(address).collect(),
        transactions,
    })
}

fn account_wallet(tx_count: usize) -> WalletData {
    let transactions = (0..tx_count)
        .map(|i| WalletTransaction {
            coin: Coin::Ethereum,
            txid: format!("0x{i:064x}"),
            block_height: Some(i as u64),
            block_time: None,
            detail: TransactionDetail::FromTo(AccountTransfer {
                from: if i % 2 == 0 { "addr0".into() } else { "0xexternal".into() },
                to: if i % 2 == 0 { "0xexternal".into() } else { "addr0".into() },
                value: Decimal::new(1, 3),
                nonce: i as u64,
                gas_price: Decimal::new(20, 9),
                gas_limit: 21_000,
                gas_used: Some(21_000),
                status: Some(true),
            }),
        })
        .collect();

    WalletData::new(Coin::Ethereum, 0).apply(&WalletDataPatch {
        addresses: vec![address(0)],
        transactions,
    })
}

fn bench_utxo_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("utxo_balance");
    for size in [100, 1_000, 10_000] {
        let data = utxo_wallet(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| BalanceCalculator::calculate(black_box(data)))
        });
    }
    group.finish();
}

fn bench_account_balance(c: &mut Criterion) {
    let data = account_wallet(5_000);
    c.bench_function("account_balance_5000", |b| {
        b.iter(|| BalanceCalculator::calculate(black_box(&data)).confirmed_spendable())
    });
}

criterion_group!(benches, bench_utxo_balance, bench_account_balance);
criterion_main!(benches);
