//! Password-based encryption of paper wallet keys.
//!
//! Argon2id stretches the password into a 256-bit key; XChaCha20-Poly1305 seals the private key.
//! The credential header (version, address, KDF parameters) is bound in as associated data, so
//! editing any cleartext field of an encrypted credential breaks authentication.

use alloy_primitives::Address;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::account::PRIVATE_KEY_SIZE;
use crate::error::{PaperWalletError, PaperWalletResult};

/// Size of the per-credential Argon2 salt.
pub const SALT_SIZE: usize = 16;

/// Size of an XChaCha20-Poly1305 nonce.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

/// Size of a sealed private key (key + tag).
pub const SEALED_KEY_SIZE: usize = PRIVATE_KEY_SIZE + TAG_SIZE;

const DERIVED_KEY_SIZE: usize = 32;

/// Domain separation label for the associated data.
const LABEL_CREDENTIAL_AD: &[u8] = b"paperwallet:credential:v1";

/// Argon2id cost parameters stored alongside every encrypted credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    /// 19 MiB, two passes, one lane.
    fn default() -> Self {
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Upper bound on memory cost accepted from a payload (256 MiB).
    pub const MAX_M_COST_KIB: u32 = 256 * 1024;
    /// Upper bound on passes accepted from a payload.
    pub const MAX_T_COST: u32 = 16;
    /// Upper bound on lanes accepted from a payload.
    pub const MAX_P_COST: u32 = 8;

    /// Checks the parameters against the bounds a decoder is willing to run.
    ///
    /// Parameters come from scanned payloads, so a hostile QR code must not be able to demand
    /// gigabytes of memory from the scanning device.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when a parameter is out of bounds.
    pub fn validate(&self) -> PaperWalletResult<()> {
        if self.p_cost == 0 || self.p_cost > Self::MAX_P_COST {
            return Err(PaperWalletError::malformed(format!(
                "kdf parallelism {} out of range",
                self.p_cost
            )));
        }
        if self.t_cost == 0 || self.t_cost > Self::MAX_T_COST {
            return Err(PaperWalletError::malformed(format!(
                "kdf passes {} out of range",
                self.t_cost
            )));
        }
        if self.m_cost_kib < 8 * self.p_cost || self.m_cost_kib > Self::MAX_M_COST_KIB {
            return Err(PaperWalletError::malformed(format!(
                "kdf memory {} KiB out of range",
                self.m_cost_kib
            )));
        }
        Ok(())
    }

    fn argon2(&self) -> PaperWalletResult<Argon2<'static>> {
        let params = Params::new(
            self.m_cost_kib,
            self.t_cost,
            self.p_cost,
            Some(DERIVED_KEY_SIZE),
        )
        .map_err(|err| PaperWalletError::crypto(format!("invalid argon2 parameters: {err}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Everything besides the ciphertext needed to re-derive the key and open the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParams {
    /// Random Argon2 salt.
    pub salt: [u8; SALT_SIZE],
    /// Random XChaCha20-Poly1305 nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Argon2id cost parameters.
    pub kdf: KdfParams,
}

/// Symmetric key derived from a password.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey([u8; DERIVED_KEY_SIZE]);

fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    kdf: &KdfParams,
) -> PaperWalletResult<DerivedKey> {
    let mut key = DerivedKey([0u8; DERIVED_KEY_SIZE]);
    kdf.argon2()?
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key.0)
        .map_err(|err| PaperWalletError::crypto(format!("argon2 derivation failed: {err}")))?;
    Ok(key)
}

/// Fills a fixed-size buffer from the operating system's entropy source.
///
/// # Errors
///
/// Returns `CryptoFailure` if the entropy source fails.
pub(crate) fn random_bytes<const N: usize>() -> PaperWalletResult<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| PaperWalletError::crypto(format!("entropy source failed: {err}")))?;
    Ok(bytes)
}

/// Constructs associated data for credential encryption.
///
/// Format: `label || version || address || m_cost || t_cost || p_cost`
fn build_associated_data(version: u8, address: &Address, kdf: &KdfParams) -> Vec<u8> {
    let mut aad = Vec::with_capacity(LABEL_CREDENTIAL_AD.len() + 1 + 20 + 12);
    aad.extend_from_slice(LABEL_CREDENTIAL_AD);
    aad.push(version);
    aad.extend_from_slice(address.as_slice());
    aad.extend_from_slice(&kdf.m_cost_kib.to_le_bytes());
    aad.extend_from_slice(&kdf.t_cost.to_le_bytes());
    aad.extend_from_slice(&kdf.p_cost.to_le_bytes());
    aad
}

/// Seals a private key under a password.
///
/// Draws a fresh salt and nonce for every call.
///
/// # Returns
///
/// The cipher parameters and the ciphertext (key followed by the 16-byte tag).
///
/// # Errors
///
/// Returns `CryptoFailure` on entropy, KDF or cipher failure.
pub(crate) fn seal_key(
    secret: &[u8; PRIVATE_KEY_SIZE],
    password: &SecretString,
    version: u8,
    address: &Address,
    kdf: KdfParams,
) -> PaperWalletResult<(CipherParams, Vec<u8>)> {
    kdf.validate()
        .map_err(|err| PaperWalletError::crypto(err.to_string()))?;

    let params = CipherParams {
        salt: random_bytes()?,
        nonce: random_bytes()?,
        kdf,
    };

    let key = derive_key(password, &params.salt, &params.kdf)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    let aad = build_associated_data(version, address, &params.kdf);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&params.nonce),
            Payload {
                msg: secret.as_slice(),
                aad: &aad,
            },
        )
        .map_err(|_| PaperWalletError::crypto("XChaCha20-Poly1305 encryption failed"))?;

    Ok((params, ciphertext))
}

/// Opens a sealed private key.
///
/// # Errors
///
/// Returns `WrongPassword` if authentication fails. That covers a wrong password as well as
/// any modified ciphertext, address, version or parameter; no partially decrypted key is ever
/// returned. Returns `MalformedPayload` if the parameters are out of bounds.
pub(crate) fn open_key(
    params: &CipherParams,
    ciphertext: &[u8],
    password: &SecretString,
    version: u8,
    address: &Address,
) -> PaperWalletResult<Zeroizing<[u8; PRIVATE_KEY_SIZE]>> {
    params.kdf.validate()?;

    let key = derive_key(password, &params.salt, &params.kdf)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
    let aad = build_associated_data(version, address, &params.kdf);

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(&params.nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| PaperWalletError::WrongPassword)?,
    );

    if plaintext.len() != PRIVATE_KEY_SIZE {
        return Err(PaperWalletError::malformed(format!(
            "sealed key has {} bytes",
            plaintext.len()
        )));
    }

    let mut secret = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
    secret.copy_from_slice(&plaintext);
    Ok(secret)
}
