//! Scan-to-transact: turn a scanned paper wallet into a transfer to the scanning user.
//!
//! The flow is split into stages whose types enforce the order of the checks:
//!
//! 1. [`ScanPipeline::acquire`] / [`ScanPipeline::inspect`] decode the payload and reject
//!    self-scans and the null address, before any password prompt.
//! 2. [`ScanPipeline::unlock`] decrypts the key. A wrong password can be retried against the
//!    same [`ScannedCredential`].
//! 3. [`ScanPipeline::prepare`] looks up the balance and yields a [`TransferDraft`].
//! 4. [`ScanPipeline::execute`] bounds-checks the amount, simulates, cross-checks the
//!    simulated call against the intended transfer, and only then signs and broadcasts.
//!
//! Nothing before the final signature changes chain state. The unlocked key lives inside the
//! [`ScanResult`] / [`TransferDraft`] and is wiped when they are dropped, whichever stage the
//! flow ends in.

use std::sync::Arc;

use alloy_primitives::{
    utils::{format_units, parse_units, ParseUnits},
    Address, U256,
};
use secrecy::SecretString;

use crate::{
    chain::{decode_transfer, encode_transfer, ChainClient, SimulatedCall, TokenUnit, TxReceipt},
    credential::{self, TransportPayload, UnlockedAccount},
    error::{PaperWalletError, PaperWalletResult},
    transport::{Transport, TransportKind},
};

/// A decoded payload that passed the address checks. No password has been used yet.
#[derive(Debug, Clone)]
pub struct ScannedCredential {
    payload: TransportPayload,
    transport: TransportKind,
}

impl ScannedCredential {
    /// Address of the scanned wallet.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.payload.address()
    }

    /// Whether the operator must be asked for a password.
    #[must_use]
    pub const fn requires_password(&self) -> bool {
        self.payload.is_encrypted()
    }

    /// Channel the payload was read from.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }
}

/// A scanned wallet, unlocked for one transfer.
#[derive(Debug)]
pub struct ScanResult {
    address: Address,
    unlocked_account: Option<UnlockedAccount>,
    transport: TransportKind,
}

impl ScanResult {
    /// Address of the scanned wallet.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The unlocked account, until it is used or discarded.
    #[must_use]
    pub const fn unlocked_account(&self) -> Option<&UnlockedAccount> {
        self.unlocked_account.as_ref()
    }

    /// Channel the payload was read from.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Wipes the key now instead of when the result is dropped.
    pub fn discard(&mut self) {
        self.unlocked_account = None;
    }
}

/// An unlocked wallet with its balance, waiting for the operator to enter an amount.
#[derive(Debug)]
pub struct TransferDraft {
    result: ScanResult,
    max: U256,
    decimals: u8,
}

impl TransferDraft {
    /// Address the funds come from.
    #[must_use]
    pub const fn from(&self) -> Address {
        self.result.address
    }

    /// Balance of the scanned wallet, the most that can be transferred.
    #[must_use]
    pub const fn max(&self) -> U256 {
        self.max
    }

    /// The balance rendered in whole units, e.g. `"12.5"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the token's decimals are out of range.
    pub fn max_display(&self) -> PaperWalletResult<String> {
        format_units(self.max, self.decimals)
            .map_err(|err| PaperWalletError::invalid_input("decimals", err.to_string()))
    }

    /// Parses an operator-entered amount such as `"2.5"` into base units and checks it
    /// against the balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if the text does not parse, is not positive or exceeds the
    /// balance.
    pub fn parse_amount(&self, text: &str) -> PaperWalletResult<U256> {
        let amount = match parse_units(text.trim(), self.decimals) {
            Ok(ParseUnits::U256(amount)) => amount,
            Ok(ParseUnits::I256(_)) => {
                return Err(PaperWalletError::InvalidAmount {
                    reason: "amount must be positive".to_string(),
                })
            }
            Err(err) => {
                return Err(PaperWalletError::InvalidAmount {
                    reason: format!("cannot parse {text:?}: {err}"),
                })
            }
        };
        self.check_amount(amount)?;
        Ok(amount)
    }

    fn check_amount(&self, amount: U256) -> PaperWalletResult<()> {
        if amount.is_zero() {
            return Err(PaperWalletError::InvalidAmount {
                reason: "amount must be positive".to_string(),
            });
        }
        if amount > self.max {
            return Err(PaperWalletError::InvalidAmount {
                reason: format!("amount {amount} exceeds balance {}", self.max),
            });
        }
        Ok(())
    }
}

/// Validates scanned credentials and moves their funds to `user_address`.
pub struct ScanPipeline {
    chain: Arc<dyn ChainClient>,
    user_address: Address,
    unit: TokenUnit,
}

impl ScanPipeline {
    /// Creates a pipeline for the scanning user.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, user_address: Address, unit: TokenUnit) -> Self {
        Self {
            chain,
            user_address,
            unit,
        }
    }

    /// Reads one payload from `transport` and inspects it.
    ///
    /// # Errors
    ///
    /// Transport errors, then anything [`ScanPipeline::inspect`] returns.
    pub async fn acquire(&self, transport: &dyn Transport) -> PaperWalletResult<ScannedCredential> {
        let bytes = transport.read().await?;
        self.inspect(&bytes, transport.kind())
    }

    /// Decodes `bytes` and runs the address checks.
    ///
    /// # Errors
    ///
    /// * `MalformedPayload` / `AddressMismatch` if the payload does not decode.
    /// * `SelfScanRejected` if the wallet is the scanning user's own account.
    /// * `InvalidAddress` for the null address.
    pub fn inspect(
        &self,
        bytes: &[u8],
        transport: TransportKind,
    ) -> PaperWalletResult<ScannedCredential> {
        let payload = credential::decode(bytes)?;
        let address = payload.address();

        if address == self.user_address {
            log::warn!("rejected scan of own account {address}");
            return Err(PaperWalletError::SelfScanRejected { address });
        }
        if address == Address::ZERO {
            return Err(PaperWalletError::InvalidAddress { address });
        }

        log::debug!("scanned paper wallet {address} over {transport}");
        Ok(ScannedCredential { payload, transport })
    }

    /// Unlocks a scanned credential. Plain credentials ignore `password`.
    ///
    /// # Errors
    ///
    /// * `PasswordRequired` if the credential is encrypted and no password is given.
    /// * `WrongPassword`; the caller may re-prompt with the same `scanned`.
    /// * `AddressMismatch` if the decrypted key does not match the stored address.
    pub fn unlock(
        &self,
        scanned: &ScannedCredential,
        password: Option<&SecretString>,
    ) -> PaperWalletResult<ScanResult> {
        let account = match &scanned.payload {
            TransportPayload::Plain(_) => scanned.payload.unlock(None)?,
            TransportPayload::Encrypted(encrypted) => {
                let password = password.ok_or(PaperWalletError::PasswordRequired)?;
                credential::unlock(encrypted, password)?
            }
        };

        Ok(ScanResult {
            address: scanned.address(),
            unlocked_account: Some(account),
            transport: scanned.transport,
        })
    }

    /// Looks up the balance of the unlocked wallet.
    ///
    /// # Errors
    ///
    /// * `PasswordRequired` if the key was already discarded.
    /// * Chain errors from the balance lookup.
    pub async fn prepare(&self, result: ScanResult) -> PaperWalletResult<TransferDraft> {
        if result.unlocked_account.is_none() {
            return Err(PaperWalletError::PasswordRequired);
        }

        let max = self.chain.get_balance(result.address, &self.unit).await?;
        log::debug!(
            "paper wallet {} holds {max} base units of {}",
            result.address,
            self.unit.symbol
        );

        Ok(TransferDraft {
            result,
            max,
            decimals: self.unit.decimals,
        })
    }

    /// Transfers `amount` (base units) from the scanned wallet to the scanning user.
    ///
    /// The key is dropped as soon as the signing call returns, whatever its outcome.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` if `amount` is zero or above the balance.
    /// * `SimulationFailed` with the chain client's reason.
    /// * `SecurityInvariantViolated` if the simulated call is not exactly the intended
    ///   transfer.
    /// * `InsufficientFunds`, `UserCancelled`, `NonceConflict` or `Chain` from signing.
    pub async fn execute(&self, draft: TransferDraft, amount: U256) -> PaperWalletResult<TxReceipt> {
        draft.check_amount(amount)?;

        let TransferDraft { mut result, .. } = draft;
        let from = result.address;
        let account = result
            .unlocked_account
            .take()
            .ok_or(PaperWalletError::PasswordRequired)?;

        let call = self
            .chain
            .simulate_transfer(from, self.user_address, amount, &self.unit)
            .await
            .map_err(|err| PaperWalletError::SimulationFailed {
                reason: err.to_string(),
            })?;

        self.cross_check(&call, from, amount)?;

        let sent = self.chain.sign_and_send(&account, &call).await;
        drop(account);
        let receipt = sent?;

        log::info!(
            "transferred {amount} {} from {from} to {}: {}",
            self.unit.symbol,
            self.user_address,
            receipt.transaction_hash
        );

        if let Err(err) = self.chain.invalidate_views(self.user_address).await {
            log::warn!("failed to refresh views after transfer: {err}");
        }

        Ok(receipt)
    }

    fn cross_check(&self, call: &SimulatedCall, from: Address, amount: U256) -> PaperWalletResult<()> {
        let violation = if call.to != self.unit.address {
            Some(format!(
                "simulated call targets {}, expected token {}",
                call.to, self.unit.address
            ))
        } else if call.from != from {
            Some(format!(
                "simulated call is sent by {}, expected {from}",
                call.from
            ))
        } else if call.input != encode_transfer(self.user_address, amount) {
            Some("simulated calldata differs from the intended transfer".to_string())
        } else if decode_transfer(&call.input) != Some((self.user_address, amount)) {
            Some("simulated recipient or amount differs from the intended transfer".to_string())
        } else {
            None
        };

        match violation {
            Some(reason) => {
                log::error!("security invariant violated before signing: {reason}");
                Err(PaperWalletError::SecurityInvariantViolated { reason })
            }
            None => Ok(()),
        }
    }
}
