//! 钱包门面
//!
//! 为一个 (币种, 账户) 组装数据提供者、手续费提供者、签名提供者、发现与同步。
//! 余额方案在构造时确定一次，之后的调用不再分派。

use std::sync::Arc;

use rust_decimal::Decimal;

use super::{
    account_transaction::AccountPrivateProvider,
    coin_select::{AccumulativeSelector, CoinSelector},
    fee_provider::{
        AccountFeeProvider, FeeOptions, FeeProvider, FeeRecord, FeeTier, UtxoFeeProvider,
    },
    network::{NetworkClient, NetworkEvents},
    private_provider::{PrivateProvider, SignedTransaction},
    utxo_transaction::UtxoPrivateProvider,
    wallet_data_provider::WdProvider,
    wallet_generator::{DiscoveryReport, WalletGenerator},
    wallet_sync::{UpdateReport, WalletSync, WatchReport},
};
use crate::{
    config::Config,
    domain::{
        address::AddressFormat,
        balance::WdBalance,
        coin::{BalanceScheme, Coin},
        derivation::{DerivationType, HdSession, Seed},
        wallet_data::{WalletAddress, WalletData, WalletTransaction},
    },
    error::{AddressError, Result, WalletError},
};

/// 构造参数
pub struct WalletBuilder {
    coin: Coin,
    account: u32,
    format: Option<AddressFormat>,
    data: Option<WalletData>,
    selector: Option<Arc<dyn CoinSelector>>,
    config: Config,
}

impl WalletBuilder {
    pub fn new(coin: Coin) -> Self {
        Self {
            coin,
            account: 0,
            format: None,
            data: None,
            selector: None,
            config: Config::default(),
        }
    }

    pub fn account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    /// 默认：账户币种 ACCOUNT，支持 SegWit 的 BECH32，否则 P2PKH
    pub fn format(mut self, format: AddressFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// 从调用方持久化的数据恢复
    pub fn data(mut self, data: WalletData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn CoinSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    fn default_format(coin: Coin) -> AddressFormat {
        let descriptor = coin.descriptor();
        match descriptor.balance_scheme {
            BalanceScheme::Account => AddressFormat::Account,
            BalanceScheme::Utxo if descriptor.segwit => AddressFormat::Bech32,
            BalanceScheme::Utxo => AddressFormat::P2pkh,
        }
    }

    pub fn build(self, seed: Seed, network: Arc<dyn NetworkClient>) -> Result<Wallet> {
        self.config
            .validate()
            .map_err(|e| WalletError::Config(format!("{:#}", e)))?;

        let coin = self.coin;
        let format = self.format.unwrap_or_else(|| Self::default_format(coin));
        if !coin.key_format().supported_formats().contains(&format) {
            return Err(AddressError::UnsupportedFormat {
                coin: coin.to_string(),
                format: format.to_string(),
            }
            .into());
        }

        let data = match self.data {
            Some(data) if data.coin != coin || data.account != self.account => {
                return Err(WalletError::validation(format!(
                    "wallet data belongs to {}/{}, expected {}/{}",
                    data.coin, data.account, coin, self.account
                )))
            }
            Some(data) => data,
            None => WalletData::new(coin, self.account),
        };

        let wd = Arc::new(WdProvider::new(data));
        let session = Arc::new(HdSession::new(seed));
        let ttl = self.config.fee.cache_ttl();

        let (fee, signer): (Arc<dyn FeeProvider>, Arc<dyn PrivateProvider>) =
            match coin.balance_scheme() {
                BalanceScheme::Utxo => {
                    let selector = self
                        .selector
                        .unwrap_or_else(|| Arc::new(AccumulativeSelector) as Arc<dyn CoinSelector>);
                    let fee = Arc::new(UtxoFeeProvider::new(
                        wd.clone(),
                        network.clone(),
                        selector,
                        ttl,
                    ));
                    let signer = Arc::new(UtxoPrivateProvider::new(
                        format,
                        session,
                        wd.clone(),
                        fee.clone(),
                        network.clone(),
                    ));
                    (fee as Arc<dyn FeeProvider>, signer as Arc<dyn PrivateProvider>)
                }
                BalanceScheme::Account => {
                    let fee = Arc::new(AccountFeeProvider::new(wd.clone(), network.clone(), ttl));
                    let signer = Arc::new(AccountPrivateProvider::new(
                        session,
                        wd.clone(),
                        fee.clone(),
                        network.clone(),
                    )?);
                    (fee as Arc<dyn FeeProvider>, signer as Arc<dyn PrivateProvider>)
                }
            };

        let generator = WalletGenerator::new(
            wd.clone(),
            signer.clone(),
            network.clone(),
            self.config.discovery.clone(),
        );
        let sync = WalletSync::new(wd.clone(), network, self.config.sync.clone());

        tracing::info!(coin = %coin, account = self.account, %format, "wallet constructed");

        Ok(Wallet {
            coin,
            format,
            wd,
            fee,
            signer,
            generator,
            sync,
        })
    }
}

pub struct Wallet {
    coin: Coin,
    format: AddressFormat,
    wd: Arc<WdProvider>,
    fee: Arc<dyn FeeProvider>,
    signer: Arc<dyn PrivateProvider>,
    generator: WalletGenerator,
    sync: WalletSync,
}

impl Wallet {
    pub fn builder(coin: Coin) -> WalletBuilder {
        WalletBuilder::new(coin)
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    pub fn wd(&self) -> &Arc<WdProvider> {
        &self.wd
    }

    /// 当前数据快照，供调用方持久化
    pub fn data(&self) -> Arc<WalletData> {
        self.wd.data()
    }

    pub fn balance(&self) -> WdBalance {
        self.wd.balance()
    }

    pub fn addresses(&self, derivation_type: Option<DerivationType>) -> Vec<WalletAddress> {
        self.wd.address().list(derivation_type)
    }

    pub fn transactions(&self) -> Vec<WalletTransaction> {
        self.wd.transaction().list()
    }

    /// 第一个纯净的收款地址，没有则派生新地址；账户币种始终是唯一地址
    pub fn receive_address(&self) -> Result<WalletAddress> {
        if self.coin.balance_scheme() == BalanceScheme::Account {
            return self.signer.new_address(DerivationType::Receive);
        }
        let balance = self.wd.balance();
        match self
            .wd
            .address()
            .list(Some(DerivationType::Receive))
            .into_iter()
            .find(|a| balance.is_pure(&a.address))
        {
            Some(address) => Ok(address),
            None => self.signer.new_address(DerivationType::Receive),
        }
    }

    pub async fn discover(&self) -> Result<DiscoveryReport> {
        self.generator.generate().await
    }

    pub async fn update(&self) -> UpdateReport {
        self.sync.update().await
    }

    pub async fn refresh_unconfirmed(&self) -> usize {
        self.sync.refresh_unconfirmed().await
    }

    pub async fn watch(&self, events: &dyn NetworkEvents) -> WatchReport {
        self.sync.watch(events).await
    }

    pub async fn wait_for_confirmation(
        &self,
        events: &dyn NetworkEvents,
        txid: &str,
    ) -> Result<WalletTransaction> {
        self.sync.wait_for_confirmation(events, txid).await
    }

    pub async fn fee_record(&self) -> FeeRecord {
        self.fee.fetch_fee_record().await
    }

    pub fn fee_options(&self, tier: FeeTier, record: Option<&FeeRecord>) -> FeeOptions {
        self.fee.fee_options(tier, record)
    }

    pub async fn calculate_fee(
        &self,
        value: Decimal,
        options: &FeeOptions,
        to: Option<&str>,
    ) -> Result<Decimal> {
        self.fee.calculate_fee(value, options, to).await
    }

    pub async fn max_amount(&self, options: &FeeOptions, to: Option<&str>) -> Result<Decimal> {
        self.fee.calculate_max_amount(options, to).await
    }

    pub async fn create_transaction(
        &self,
        to: &str,
        value: Decimal,
        options: &FeeOptions,
    ) -> Result<SignedTransaction> {
        self.signer.create_transaction(to, value, options).await
    }

    pub async fn broadcast(&self, tx: &SignedTransaction) -> Result<String> {
        self.signer.broadcast(tx).await
    }

    pub async fn send(
        &self,
        to: &str,
        value: Decimal,
        options: &FeeOptions,
    ) -> Result<SignedTransaction> {
        self.signer.send_transaction(to, value, options).await
    }
}
