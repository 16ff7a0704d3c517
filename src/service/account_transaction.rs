//! 账户模型交易构造与签名（EIP-155 legacy）

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, TransactionRequest, H160},
};
use rust_decimal::Decimal;

use super::{
    fee_provider::{AccountFeeProvider, FeeOptions},
    network::NetworkClient,
    private_provider::{
        broadcast_signed, check_amount, derive_wallet_address, tracked_path, PrivateProvider,
        SignedPayload, SignedTransaction,
    },
    wallet_data_provider::WdProvider,
};
use crate::{
    domain::{
        address::{Address, AddressFormat},
        coin::Coin,
        derivation::{DerivationType, HdSession},
        wallet_data::{AccountTransfer, TransactionDetail, WalletAddress, WalletTransaction},
    },
    error::{KeyError, Result, WalletError},
    utils::amount::to_u256_units,
};

pub struct AccountPrivateProvider {
    coin: Coin,
    account: u32,
    chain_id: u64,
    session: Arc<HdSession>,
    wd: Arc<WdProvider>,
    fee: Arc<AccountFeeProvider>,
    network: Arc<dyn NetworkClient>,
}

impl AccountPrivateProvider {
    pub fn new(
        session: Arc<HdSession>,
        wd: Arc<WdProvider>,
        fee: Arc<AccountFeeProvider>,
        network: Arc<dyn NetworkClient>,
    ) -> Result<Self> {
        let coin = wd.coin();
        let chain_id = coin.descriptor().chain_id.ok_or_else(|| {
            WalletError::UnsupportedScheme(format!("{} has no chain id", coin))
        })?;
        Ok(Self {
            coin,
            account: wd.account(),
            chain_id,
            session,
            wd,
            fee,
            network,
        })
    }

    /// 唯一跟踪地址
    fn source(&self) -> Result<WalletAddress> {
        self.wd
            .address()
            .list(None)
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::precondition(format!("{} wallet has no address", self.coin)))
    }

    /// 本地估算：已跟踪交易中由该地址发出的数量
    ///
    /// 并发发送或未跟踪的外部交易会让它落后于链上 nonce
    pub fn local_nonce(&self, from: &str) -> u64 {
        self.wd
            .data()
            .transactions
            .values()
            .filter(|tx| match &tx.detail {
                TransactionDetail::FromTo(transfer) => transfer.from.eq_ignore_ascii_case(from),
                TransactionDetail::InputsOutputs { .. } => false,
            })
            .count() as u64
    }
}

#[async_trait]
impl PrivateProvider for AccountPrivateProvider {
    fn coin(&self) -> Coin {
        self.coin
    }

    fn derive_address(
        &self,
        derivation_type: DerivationType,
        index: u32,
    ) -> Result<WalletAddress> {
        derive_wallet_address(
            &self.session,
            self.coin,
            AddressFormat::Account,
            self.account,
            derivation_type,
            index,
        )
    }

    /// 账户币种只有一个地址：receive/0
    fn new_address(&self, _derivation_type: DerivationType) -> Result<WalletAddress> {
        if let Ok(existing) = self.source() {
            return Ok(existing);
        }
        let address = self.derive_address(DerivationType::Receive, 0)?;
        self.wd.address().add(address.clone());
        Ok(address)
    }

    async fn create_transaction(
        &self,
        to: &str,
        value: Decimal,
        options: &FeeOptions,
    ) -> Result<SignedTransaction> {
        check_amount(self.coin, value)?;
        let destination = Address::parse(self.coin, to)?;
        let source = self.source()?;

        let (gas_price, gas_limit) = options.gas()?;
        let gas_limit = match gas_limit {
            Some(limit) => limit.max(self.fee.min_gas_limit()),
            None => self.fee.estimate_gas_limit(Some(to), Some(value)).await,
        };
        let fee = gas_price * Decimal::from(gas_limit);

        let available = self.wd.balance().confirmed_spendable();
        let needed = value + fee;
        if needed > available {
            return Err(WalletError::InsufficientFunds { needed, available });
        }

        let nonce = self.local_nonce(&source.address);
        let decimals = self.coin.decimals();

        let path = tracked_path(&self.wd, AddressFormat::Account, &source.address)?;
        let key = self.session.derive_private_key(self.coin, &path)?;
        let wallet = LocalWallet::from_bytes(key.secret_bytes())
            .map_err(|e| KeyError::PrivateKey(e.to_string()))?
            .with_chain_id(self.chain_id);
        drop(key);

        let request = TransactionRequest::new()
            .from(wallet.address())
            .to(H160::from_slice(destination.payload()))
            .value(to_u256_units(value, decimals)?)
            .gas(gas_limit)
            .gas_price(to_u256_units(gas_price, decimals)?)
            .nonce(nonce)
            .chain_id(self.chain_id);
        let tx = TypedTransaction::Legacy(request);

        let signature = wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| KeyError::PrivateKey(e.to_string()))?;
        let recovered = signature
            .recover(tx.sighash())
            .map_err(|e| WalletError::precondition(e.to_string()))?;
        if recovered != wallet.address() {
            return Err(WalletError::precondition(
                "signature does not recover to the spending address",
            ));
        }

        let raw = tx.rlp_signed(&signature);
        let txid = format!("{:#x}", tx.hash(&signature));

        let record = WalletTransaction {
            coin: self.coin,
            txid: txid.clone(),
            block_height: None,
            block_time: None,
            detail: TransactionDetail::FromTo(AccountTransfer {
                from: source.address.clone(),
                to: destination.to_string(),
                value,
                nonce,
                gas_price,
                gas_limit,
                gas_used: None,
                status: None,
            }),
        };

        tracing::debug!(coin = %self.coin, %txid, from = %source.address, nonce, gas_limit, "account transaction signed");

        Ok(SignedTransaction {
            coin: self.coin,
            txid,
            raw_hex: format!("0x{}", hex::encode(&raw)),
            fee,
            value,
            to: destination.to_string(),
            nonce: Some(nonce),
            record,
            payload: SignedPayload::Account {
                tx,
                signature: Some(signature),
            },
        })
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<String> {
        broadcast_signed(self.network.as_ref(), &self.wd, tx).await
    }
}
