//! Chain-client collaborator and ERC-20 transfer calldata.
//!
//! The core never talks to a node itself. A [`ChainClient`] looks up balances, dry-runs the
//! transfer, signs and broadcasts it, and refreshes whatever views the host keeps.

use alloy_core::sol_types::SolValue;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::credential::UnlockedAccount;

/// Selector of `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// The token amounts are denominated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUnit {
    /// ERC-20 contract address.
    pub address: Address,
    /// Decimals used to render and parse amounts.
    pub decimals: u8,
    /// Display symbol.
    pub symbol: String,
}

/// A call that was dry-run successfully against current chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedCall {
    /// Sender of the call.
    pub from: Address,
    /// Contract called.
    pub to: Address,
    /// Calldata.
    pub input: Bytes,
    /// Gas used by the dry-run, if reported.
    pub gas_estimate: Option<u64>,
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Hash of the transaction.
    pub transaction_hash: B256,
    /// Block the transaction was included in, if already mined.
    pub block_number: Option<u64>,
}

/// Failure reported by a [`ChainClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The sender cannot cover amount plus fees.
    #[error("insufficient funds")]
    InsufficientFunds,
    /// The signer refused.
    #[error("user cancelled")]
    UserCancelled,
    /// The nonce is already used or pending.
    #[error("{reason}")]
    NonceConflict {
        /// Reason reported by the node
        reason: String,
    },
    /// Execution reverted.
    #[error("{reason}")]
    Reverted {
        /// Revert reason
        reason: String,
    },
    /// Any other RPC failure.
    #[error("{reason}")]
    Rpc {
        /// Reason reported by the node
        reason: String,
    },
}

impl ChainError {
    /// Classifies a raw node or wallet error message.
    #[must_use]
    pub fn from_rpc_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if lowered.contains("nonce too low")
            || lowered.contains("replacement transaction underpriced")
            || lowered.contains("already known")
        {
            Self::NonceConflict {
                reason: message.to_string(),
            }
        } else if lowered.contains("user rejected") || lowered.contains("denied") {
            Self::UserCancelled
        } else if lowered.contains("execution reverted") {
            Self::Reverted {
                reason: message.to_string(),
            }
        } else {
            Self::Rpc {
                reason: message.to_string(),
            }
        }
    }
}

/// Access to the chain on behalf of the scanning user.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance of `address` in `unit`, in base units.
    async fn get_balance(&self, address: Address, unit: &TokenUnit) -> Result<U256, ChainError>;

    /// Builds the ERC-20 transfer of `amount` from `from` to `to` and dry-runs it.
    async fn simulate_transfer(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        unit: &TokenUnit,
    ) -> Result<SimulatedCall, ChainError>;

    /// Signs `call` with `account` and broadcasts it.
    async fn sign_and_send(
        &self,
        account: &UnlockedAccount,
        call: &SimulatedCall,
    ) -> Result<TxReceipt, ChainError>;

    /// Refreshes cached balances and transaction history of `address`.
    async fn invalidate_views(&self, address: Address) -> Result<(), ChainError>;
}

/// ABI-encodes `transfer(to, amount)`.
#[must_use]
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    let mut input = TRANSFER_SELECTOR.to_vec();
    input.extend_from_slice(&(to, amount).abi_encode_params());
    input.into()
}

/// Decodes `transfer(to, amount)` calldata. `None` for any other call.
#[must_use]
pub fn decode_transfer(input: &[u8]) -> Option<(Address, U256)> {
    let params = input.strip_prefix(&TRANSFER_SELECTOR)?;
    <(Address, U256)>::abi_decode_params(params).ok()
}
