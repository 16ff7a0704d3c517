//! 签名提供者
//!
//! 私钥只在单次签名调用内存在：按输入地址的派生路径从 `HdSession` 取出，用完即清零。

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Signature};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{fee_provider::FeeOptions, network::NetworkClient, wallet_data_provider::WdProvider};
use crate::{
    domain::{
        address::AddressFormat,
        coin::Coin,
        derivation::{DerivationType, HdPath, HdSession},
        wallet_data::{WalletAddress, WalletTransaction},
    },
    error::{Result, WalletError},
    utils::amount::validate_amount,
};

/// 已构造的交易载荷
#[derive(Debug, Clone)]
pub enum SignedPayload {
    Utxo(bitcoin::Transaction),
    Account {
        tx: TypedTransaction,
        signature: Option<Signature>,
    },
}

/// create_transaction 的结果
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    pub coin: Coin,
    pub txid: String,
    pub raw_hex: String,
    /// 以币为单位
    pub fee: Decimal,
    pub value: Decimal,
    pub to: String,
    /// 账户币种的本地 nonce
    pub nonce: Option<u64>,
    /// 广播成功后并入钱包数据的未确认记录
    #[serde(skip)]
    pub record: WalletTransaction,
    #[serde(skip)]
    pub payload: SignedPayload,
}

impl SignedTransaction {
    pub fn is_fully_signed(&self) -> bool {
        match &self.payload {
            SignedPayload::Utxo(tx) => {
                !tx.input.is_empty()
                    && tx
                        .input
                        .iter()
                        .all(|input| !input.script_sig.is_empty() || !input.witness.is_empty())
            }
            SignedPayload::Account { signature, .. } => signature.is_some(),
        }
    }
}

#[async_trait]
pub trait PrivateProvider: Send + Sync {
    fn coin(&self) -> Coin;

    /// 只派生，不写入钱包数据
    fn derive_address(
        &self,
        derivation_type: DerivationType,
        index: u32,
    ) -> Result<WalletAddress>;

    /// 派生下一个索引并加入钱包数据
    fn new_address(&self, derivation_type: DerivationType) -> Result<WalletAddress>;

    /// 解析来源、选币/估算、构造并签名
    async fn create_transaction(
        &self,
        to: &str,
        value: Decimal,
        options: &FeeOptions,
    ) -> Result<SignedTransaction>;

    /// 广播前校验签名完整
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<String>;

    async fn send_transaction(
        &self,
        to: &str,
        value: Decimal,
        options: &FeeOptions,
    ) -> Result<SignedTransaction> {
        let tx = self.create_transaction(to, value, options).await?;
        self.broadcast(&tx).await?;
        Ok(tx)
    }
}

pub(crate) fn check_amount(coin: Coin, value: Decimal) -> Result<()> {
    validate_amount(value, coin.decimals())?;
    Ok(())
}

/// 按钱包的地址格式派生一个地址
pub(crate) fn derive_wallet_address(
    session: &HdSession,
    coin: Coin,
    format: AddressFormat,
    account: u32,
    derivation_type: DerivationType,
    index: u32,
) -> Result<WalletAddress> {
    let path = HdPath::new(coin, format, account, derivation_type, index);
    let address = session.derive_address(coin, format, &path)?;
    Ok(WalletAddress {
        address: address.to_string(),
        derivation_type,
        index,
        account,
    })
}

/// 派生路径对应的钱包地址必须已被跟踪
pub(crate) fn tracked_path(
    wd: &WdProvider,
    format: AddressFormat,
    address: &str,
) -> Result<HdPath> {
    let data = wd.data();
    let tracked = data.find_address(address).ok_or_else(|| {
        WalletError::precondition(format!("address {} is not tracked by this wallet", address))
    })?;
    Ok(HdPath::new(
        data.coin,
        format,
        tracked.account,
        tracked.derivation_type,
        tracked.index,
    ))
}

pub(crate) async fn broadcast_signed(
    network: &dyn NetworkClient,
    wd: &WdProvider,
    tx: &SignedTransaction,
) -> Result<String> {
    if !tx.is_fully_signed() {
        return Err(WalletError::precondition(format!(
            "transaction {} is not fully signed",
            tx.txid
        )));
    }
    let coin = wd.coin();
    if tx.coin != coin {
        return Err(WalletError::CoinMismatch {
            txid: tx.txid.clone(),
            expected: coin.to_string(),
            found: tx.coin.to_string(),
        });
    }

    let txid = network.broadcast_transaction(&tx.raw_hex).await?;
    if !txid.eq_ignore_ascii_case(&tx.txid) {
        tracing::warn!(coin = %coin, local = %tx.txid, remote = %txid, "network returned a different txid");
    }
    wd.transaction().add(tx.record.clone())?;

    tracing::info!(coin = %coin, txid = %tx.txid, to = %tx.to, value = %tx.value, fee = %tx.fee, "transaction broadcast");
    Ok(txid)
}
