//! UTXO 交易构造与签名
//!
//! 每个输入按前序输出的脚本类型签名：
//! - P2PKH：legacy sighash，script_sig = <sig> <pubkey>
//! - P2SH-P2WPKH：script_sig = <redeem>，witness = <sig> <pubkey>
//! - P2WPKH：witness = <sig> <pubkey>

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use bitcoin::{
    absolute,
    consensus::encode::serialize_hex,
    hashes::{hash160, Hash},
    opcodes::OP_0,
    script::Builder,
    secp256k1::{Message, Secp256k1, SecretKey},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use rust_decimal::Decimal;

use super::{
    coin_select::{Selection, SelectionInput},
    fee_provider::{FeeOptions, UtxoFeeProvider},
    network::NetworkClient,
    private_provider::{
        broadcast_signed, check_amount, derive_wallet_address, tracked_path, PrivateProvider,
        SignedPayload, SignedTransaction,
    },
    wallet_data_provider::WdProvider,
};
use crate::{
    domain::{
        address::{push_bytes, Address, AddressFormat, PrivateKey},
        coin::Coin,
        derivation::{DerivationType, HdSession},
        wallet_data::{
            ScriptType, TransactionDetail, UtxoInput, UtxoOutput, WalletAddress, WalletTransaction,
        },
    },
    error::{KeyError, Result, WalletError},
    utils::amount::from_base_units,
};

/// 输出地址对应的脚本类型
fn output_script_type(address: &Address) -> ScriptType {
    match (address.format(), address.payload().len()) {
        (AddressFormat::P2pkh, _) => ScriptType::P2pkh,
        (AddressFormat::P2sh, _) => ScriptType::P2sh,
        (AddressFormat::Bech32, 32) => ScriptType::P2wsh,
        (AddressFormat::Bech32, _) => ScriptType::P2wpkh,
        (AddressFormat::Account, _) => ScriptType::Unknown,
    }
}

/// OP_0 <hash160(pubkey)>，同时是 P2SH-P2WPKH 的 redeem 脚本
fn p2wpkh_script(pubkey: &[u8]) -> Result<ScriptBuf> {
    let hash = hash160::Hash::hash(pubkey);
    Ok(Builder::new()
        .push_opcode(OP_0)
        .push_slice(push_bytes(hash.as_byte_array())?)
        .into_script())
}

fn sign_digest(
    secp: &Secp256k1<bitcoin::secp256k1::All>,
    key: &PrivateKey,
    digest: [u8; 32],
) -> Result<Vec<u8>> {
    let mut secret = SecretKey::from_slice(key.secret_bytes())
        .map_err(|e| KeyError::PrivateKey(e.to_string()))?;
    let signature = secp.sign_ecdsa(&Message::from_digest(digest), &secret);
    secret.non_secure_erase();

    let mut der = signature.serialize_der().to_vec();
    der.push(EcdsaSighashType::All.to_u32() as u8);
    Ok(der)
}

/// 单个输入的解锁数据
struct Unlock {
    script_sig: ScriptBuf,
    witness: Witness,
}

pub struct UtxoPrivateProvider {
    coin: Coin,
    format: AddressFormat,
    account: u32,
    session: Arc<HdSession>,
    wd: Arc<WdProvider>,
    fee: Arc<UtxoFeeProvider>,
    network: Arc<dyn NetworkClient>,
}

impl UtxoPrivateProvider {
    pub fn new(
        format: AddressFormat,
        session: Arc<HdSession>,
        wd: Arc<WdProvider>,
        fee: Arc<UtxoFeeProvider>,
        network: Arc<dyn NetworkClient>,
    ) -> Self {
        Self {
            coin: wd.coin(),
            account: wd.account(),
            format,
            session,
            wd,
            fee,
            network,
        }
    }

    pub fn format(&self) -> AddressFormat {
        self.format
    }

    /// 解析选币结果中的地址；找零输出改写到可用的 CHANGE 地址
    fn resolve_outputs(&self, selection: &Selection) -> Result<Vec<(Address, u64)>> {
        let mut outputs = Vec::with_capacity(selection.outputs.len());
        for output in &selection.outputs {
            let value = output.value.ok_or_else(|| {
                WalletError::precondition("coin selection returned an output without value")
            })?;
            let address = match &output.address {
                Some(address) => Address::parse(self.coin, address)?,
                None => {
                    let change = self.wd.address().last_usable(self)?;
                    tracing::debug!(coin = %self.coin, address = %change.address, "change output");
                    Address::parse(self.coin, &change.address)?
                }
            };
            outputs.push((address, value));
        }
        Ok(outputs)
    }

    fn unsigned(inputs: &[SelectionInput], outputs: &[(Address, u64)]) -> Result<Transaction> {
        let input = inputs
            .iter()
            .map(|i| {
                let txid = Txid::from_str(&i.txid)
                    .map_err(|e| WalletError::validation(format!("txid {}: {}", i.txid, e)))?;
                Ok(TxIn {
                    previous_output: OutPoint { txid, vout: i.vout },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let output = outputs
            .iter()
            .map(|(address, value)| {
                Ok(TxOut {
                    value: Amount::from_sat(*value),
                    script_pubkey: address.script_pubkey()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        })
    }

    /// 所有签名都在未修改的交易上计算，最后一次性写入
    fn sign(&self, tx: &mut Transaction, inputs: &[SelectionInput]) -> Result<()> {
        let secp = Secp256k1::new();
        let mut unlocks = Vec::with_capacity(inputs.len());

        {
            let mut cache = SighashCache::new(&*tx);
            for (index, input) in inputs.iter().enumerate() {
                let path = tracked_path(&self.wd, self.format, &input.address)?;
                let key = self.session.derive_private_key(self.coin, &path)?;
                let pubkey = key.public_key()?;
                let pubkey_bytes = pubkey.compressed().to_vec();

                let unlock = match input.script_type {
                    ScriptType::P2pkh => {
                        let script_pubkey = pubkey.to_address(AddressFormat::P2pkh)?.script_pubkey()?;
                        let sighash = cache
                            .legacy_signature_hash(index, &script_pubkey, EcdsaSighashType::All.to_u32())
                            .map_err(|e| WalletError::precondition(e.to_string()))?;
                        let sig = sign_digest(&secp, &key, sighash.to_byte_array())?;
                        Unlock {
                            script_sig: Builder::new()
                                .push_slice(push_bytes(&sig)?)
                                .push_slice(push_bytes(&pubkey_bytes)?)
                                .into_script(),
                            witness: Witness::new(),
                        }
                    }
                    ScriptType::P2sh | ScriptType::P2wpkh => {
                        let redeem = p2wpkh_script(&pubkey_bytes)?;
                        let sighash = cache
                            .p2wpkh_signature_hash(
                                index,
                                &redeem,
                                Amount::from_sat(input.value),
                                EcdsaSighashType::All,
                            )
                            .map_err(|e| WalletError::precondition(e.to_string()))?;
                        let sig = sign_digest(&secp, &key, sighash.to_byte_array())?;

                        let mut witness = Witness::new();
                        witness.push(sig);
                        witness.push(pubkey_bytes);

                        let script_sig = if input.script_type == ScriptType::P2sh {
                            Builder::new()
                                .push_slice(push_bytes(redeem.as_bytes())?)
                                .into_script()
                        } else {
                            ScriptBuf::new()
                        };
                        Unlock {
                            script_sig,
                            witness,
                        }
                    }
                    other => {
                        return Err(WalletError::UnsupportedScript(format!(
                            "{}:{} has script type {:?}",
                            input.txid, input.vout, other
                        )))
                    }
                };
                unlocks.push(unlock);
            }
        }

        for (txin, unlock) in tx.input.iter_mut().zip(unlocks) {
            txin.script_sig = unlock.script_sig;
            txin.witness = unlock.witness;
        }
        Ok(())
    }

    fn record(
        &self,
        tx: &Transaction,
        inputs: &[SelectionInput],
        outputs: &[(Address, u64)],
    ) -> WalletTransaction {
        let decimals = self.coin.decimals();
        let inputs = tx
            .input
            .iter()
            .zip(inputs)
            .map(|(txin, selected)| UtxoInput {
                prev_txid: selected.txid.clone(),
                prev_index: selected.vout,
                sequence: txin.sequence.0,
                sig_script: hex::encode(txin.script_sig.as_bytes()),
                witness: txin.witness.iter().map(hex::encode).collect(),
            })
            .collect();
        let outputs = tx
            .output
            .iter()
            .zip(outputs)
            .map(|(txout, (address, value))| UtxoOutput {
                value: from_base_units(*value, decimals),
                addresses: vec![address.to_string()],
                script: hex::encode(txout.script_pubkey.as_bytes()),
                script_type: output_script_type(address),
            })
            .collect();

        WalletTransaction {
            coin: self.coin,
            txid: tx.compute_txid().to_string(),
            block_height: None,
            block_time: None,
            detail: TransactionDetail::InputsOutputs { inputs, outputs },
        }
    }
}

#[async_trait]
impl PrivateProvider for UtxoPrivateProvider {
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
            self.format,
            self.account,
            derivation_type,
            index,
        )
    }

    fn new_address(&self, derivation_type: DerivationType) -> Result<WalletAddress> {
        let index = self.wd.address().next_index(derivation_type);
        let address = self.derive_address(derivation_type, index)?;
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
        let fee_rate = options.fee_rate()?;

        let selection = self.fee.select(value, Some(to), fee_rate)?;
        let outputs = self.resolve_outputs(&selection)?;

        let mut tx = Self::unsigned(&selection.inputs, &outputs)?;
        self.sign(&mut tx, &selection.inputs)?;

        let record = self.record(&tx, &selection.inputs, &outputs);
        let signed = SignedTransaction {
            coin: self.coin,
            txid: record.txid.clone(),
            raw_hex: serialize_hex(&tx),
            fee: from_base_units(selection.fee, self.coin.decimals()),
            value,
            to: destination.to_string(),
            nonce: None,
            record,
            payload: SignedPayload::Utxo(tx),
        };

        tracing::debug!(
            coin = %self.coin,
            txid = %signed.txid,
            inputs = selection.inputs.len(),
            outputs = outputs.len(),
            fee = %signed.fee,
            "utxo transaction signed"
        );
        Ok(signed)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<String> {
        broadcast_signed(self.network.as_ref(), &self.wd, tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2wpkh_script_shape() {
        let pubkey =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798").unwrap();
        let script = p2wpkh_script(&pubkey).unwrap();
        assert_eq!(
            hex::encode(script.as_bytes()),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_output_script_type() {
        let address = Address::parse(Coin::Bitcoin, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap();
        assert_eq!(output_script_type(&address), ScriptType::P2pkh);
        let address =
            Address::parse(Coin::Bitcoin, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap();
        assert_eq!(output_script_type(&address), ScriptType::P2wpkh);
    }
}
