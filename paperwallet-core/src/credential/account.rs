//! Key material for paper wallets.
//!
//! Private keys are secp256k1 scalars; addresses are the usual 20-byte EVM addresses derived
//! from them. Raw key bytes only live inside zeroizing containers.

use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy_primitives::{Address, Signature, B256};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{PaperWalletError, PaperWalletResult};

/// Size of a secp256k1 private key.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// A random draw lands outside the curve order with probability ~2^-128; the bound only exists
/// so a broken entropy source cannot spin forever.
const MAX_KEY_ATTEMPTS: usize = 8;

/// A freshly generated private key and its address.
///
/// Owned by the codec while a credential is being generated; it is sealed or serialized and
/// then dropped, which wipes the key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct RawKeyPair {
    secret: [u8; PRIVATE_KEY_SIZE],
    #[zeroize(skip)]
    address: Address,
}

impl RawKeyPair {
    /// Draws a new key from the operating system's entropy source.
    ///
    /// # Errors
    ///
    /// Returns `CryptoFailure` if the entropy source fails.
    pub(crate) fn generate() -> PaperWalletResult<Self> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let mut secret = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
            OsRng.try_fill_bytes(secret.as_mut()).map_err(|err| {
                PaperWalletError::crypto(format!("entropy source failed: {err}"))
            })?;

            if let Ok(address) = derive_address(&secret) {
                return Ok(Self {
                    secret: *secret,
                    address,
                });
            }
        }

        Err(PaperWalletError::crypto(
            "entropy source produced no valid secp256k1 key",
        ))
    }

    pub(crate) const fn address(&self) -> Address {
        self.address
    }

    pub(crate) const fn secret(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.secret
    }
}

impl std::fmt::Debug for RawKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawKeyPair")
            .field("secret", &"[REDACTED]")
            .field("address", &self.address)
            .finish()
    }
}

/// Derives the EVM address controlled by `secret`.
///
/// # Errors
///
/// Returns `CryptoFailure` if `secret` is zero or not below the curve order.
pub(crate) fn derive_address(secret: &[u8; PRIVATE_KEY_SIZE]) -> PaperWalletResult<Address> {
    let signer = PrivateKeySigner::from_slice(secret)
        .map_err(|_| PaperWalletError::crypto("invalid secp256k1 private key"))?;
    Ok(signer.address())
}

/// A decrypted credential, ready to sign exactly one transfer.
///
/// The signing key wipes itself when dropped. Hold this only for the duration of the transfer
/// and never store, log or serialize it.
pub struct UnlockedAccount {
    signer: PrivateKeySigner,
}

impl UnlockedAccount {
    pub(crate) fn from_secret(secret: &[u8; PRIVATE_KEY_SIZE]) -> PaperWalletResult<Self> {
        let signer = PrivateKeySigner::from_slice(secret)
            .map_err(|_| PaperWalletError::crypto("invalid secp256k1 private key"))?;
        Ok(Self { signer })
    }

    /// The address controlled by this account.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs a 32-byte digest (e.g. a transaction signing hash).
    ///
    /// # Errors
    ///
    /// Returns `CryptoFailure` if the signer rejects the digest.
    pub fn sign_hash(&self, hash: &B256) -> PaperWalletResult<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|err| PaperWalletError::crypto(format!("signing failed: {err}")))
    }
}

impl std::fmt::Debug for UnlockedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedAccount")
            .field("key", &"[REDACTED]")
            .field("address", &self.address())
            .finish()
    }
}
