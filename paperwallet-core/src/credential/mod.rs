//! Paper wallet credentials: key generation, sealing and the transport payload.
//!
//! A credential is a fresh secp256k1 key and its address, packaged for a QR code or an NFC tag.
//! Encrypted credentials keep the address in the clear so a scanner can look up the balance
//! before asking for the password. See [`format`] for the byte layout.

mod account;
mod crypto;
mod format;

use alloy_primitives::Address;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{PaperWalletError, PaperWalletResult};

pub use account::{UnlockedAccount, PRIVATE_KEY_SIZE};
pub use crypto::{CipherParams, KdfParams, NONCE_SIZE, SALT_SIZE, SEALED_KEY_SIZE};
pub use format::{
    decode_text, encode_text, CURRENT_VERSION, ENCRYPTED_V1_SIZE, MAGIC, PLAIN_V1_SIZE,
};

/// A password-sealed credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    version: u8,
    address: Address,
    cipher_params: CipherParams,
    ciphertext: Vec<u8>,
}

impl EncryptedCredential {
    /// Wire format version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Address of the wallet, readable without the password.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Salt, nonce and KDF cost parameters.
    #[must_use]
    pub const fn cipher_params(&self) -> &CipherParams {
        &self.cipher_params
    }

    /// Sealed private key including the authentication tag.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// An unencrypted credential. Anyone holding the paper controls the funds.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PlainCredential {
    #[zeroize(skip)]
    version: u8,
    #[zeroize(skip)]
    address: Address,
    private_key: [u8; PRIVATE_KEY_SIZE],
}

impl PlainCredential {
    /// Wire format version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Address of the wallet.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    fn verify(&self) -> PaperWalletResult<()> {
        let derived = account::derive_address(&self.private_key).map_err(|_| {
            PaperWalletError::malformed("private key is not a valid secp256k1 scalar")
        })?;
        if derived != self.address {
            return Err(PaperWalletError::AddressMismatch {
                stored: self.address,
                derived,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainCredential")
            .field("version", &self.version)
            .field("address", &self.address)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// What gets printed on paper or written to a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPayload {
    /// Password-sealed key.
    Encrypted(EncryptedCredential),
    /// Key in the clear.
    Plain(PlainCredential),
}

impl TransportPayload {
    /// Address of the wallet, available for both variants without a password.
    #[must_use]
    pub const fn address(&self) -> Address {
        match self {
            Self::Encrypted(credential) => credential.address,
            Self::Plain(credential) => credential.address,
        }
    }

    /// Wire format version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self {
            Self::Encrypted(credential) => credential.version,
            Self::Plain(credential) => credential.version,
        }
    }

    /// Whether a password is needed to unlock this credential.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    /// Unlocks the credential for signing.
    ///
    /// # Errors
    ///
    /// * `PasswordRequired` if the credential is encrypted and no password is given.
    /// * Whatever [`unlock`] returns for encrypted credentials.
    /// * `AddressMismatch` if a plain key does not derive its stored address, `MalformedPayload`
    ///   if it is not a valid key at all.
    pub fn unlock(&self, password: Option<&SecretString>) -> PaperWalletResult<UnlockedAccount> {
        match (self, password) {
            (Self::Encrypted(credential), Some(password)) => unlock(credential, password),
            (Self::Encrypted(_), None) => Err(PaperWalletError::PasswordRequired),
            (Self::Plain(credential), _) => {
                credential.verify()?;
                UnlockedAccount::from_secret(&credential.private_key)
            }
        }
    }

    /// Short, non-secret identifier of the encoded payload, safe to log.
    ///
    /// For plain credentials the encoding contains the key, so only a truncated digest is
    /// exposed.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let encoded = Zeroizing::new(encode(self));
        let digest = Sha256::digest(encoded.as_slice());
        hex::encode(&digest[..8])
    }
}

/// Generates a fresh credential with the default KDF cost.
///
/// # Errors
///
/// See [`generate_with_params`].
pub fn generate(password: Option<&SecretString>) -> PaperWalletResult<TransportPayload> {
    generate_with_params(password, KdfParams::default())
}

/// Generates a fresh credential.
///
/// With a password the key is sealed with Argon2id + XChaCha20-Poly1305 under `kdf`; without
/// one the key is stored in the clear.
///
/// # Errors
///
/// * `InvalidInput` if the password is empty.
/// * `CryptoFailure` on entropy or cipher failure, or if `kdf` is out of bounds.
pub fn generate_with_params(
    password: Option<&SecretString>,
    kdf: KdfParams,
) -> PaperWalletResult<TransportPayload> {
    if password.is_some_and(|password| password.expose_secret().is_empty()) {
        return Err(PaperWalletError::invalid_input(
            "password",
            "password cannot be empty",
        ));
    }

    let key_pair = account::RawKeyPair::generate()?;
    let address = key_pair.address();

    let payload = match password {
        Some(password) => {
            let (cipher_params, ciphertext) =
                crypto::seal_key(key_pair.secret(), password, CURRENT_VERSION, &address, kdf)?;
            TransportPayload::Encrypted(EncryptedCredential {
                version: CURRENT_VERSION,
                address,
                cipher_params,
                ciphertext,
            })
        }
        None => TransportPayload::Plain(PlainCredential {
            version: CURRENT_VERSION,
            address,
            private_key: *key_pair.secret(),
        }),
    };

    log::debug!(
        "generated {} credential for {address}",
        if payload.is_encrypted() {
            "encrypted"
        } else {
            "plain"
        }
    );
    Ok(payload)
}

/// Serializes a payload in the current wire format.
#[must_use]
pub fn encode(payload: &TransportPayload) -> Vec<u8> {
    format::encode(payload)
}

/// Parses payload bytes of any supported version.
///
/// Plain credentials are checked right away: the key must derive the stored address.
///
/// # Errors
///
/// * `MalformedPayload` for unknown versions, structural errors and plain keys that are not
///   valid secp256k1 scalars.
/// * `AddressMismatch` if a plain key does not derive its stored address.
pub fn decode(bytes: &[u8]) -> PaperWalletResult<TransportPayload> {
    let payload = format::decode(bytes)?;
    if let TransportPayload::Plain(credential) = &payload {
        credential.verify()?;
    }
    Ok(payload)
}

/// Decrypts an encrypted credential.
///
/// # Errors
///
/// * `WrongPassword` if authentication fails (wrong password or any tampered field).
/// * `AddressMismatch` if the decrypted key does not derive the stored address.
/// * `MalformedPayload` if the KDF parameters are out of bounds or the sealed key is not a
///   valid secp256k1 scalar.
pub fn unlock(
    credential: &EncryptedCredential,
    password: &SecretString,
) -> PaperWalletResult<UnlockedAccount> {
    let secret = crypto::open_key(
        &credential.cipher_params,
        &credential.ciphertext,
        password,
        credential.version,
        &credential.address,
    )?;

    let derived = account::derive_address(&secret).map_err(|_| {
        PaperWalletError::malformed("sealed key is not a valid secp256k1 scalar")
    })?;
    if derived != credential.address {
        return Err(PaperWalletError::AddressMismatch {
            stored: credential.address,
            derived,
        });
    }

    UnlockedAccount::from_secret(&secret)
}

/// Address of any payload, without a password.
#[must_use]
pub const fn address_of(payload: &TransportPayload) -> Address {
    payload.address()
}
