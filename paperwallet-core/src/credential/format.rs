//! Versioned binary wire format for transport payloads.
//!
//! Payloads are small enough for a QR code or a 144-byte NFC tag:
//!
//! ```text
//! magic    "PW"          2
//! version  u8            1
//! kind     u8            1    0x01 plain, 0x02 encrypted
//! address  [u8; 20]     20
//!
//! plain:      private_key [u8; 32]
//! encrypted:  kdf_alg u8 (0x01 = argon2id)
//!             m_cost u32 || t_cost u32 || p_cost u32
//!             salt [u8; 16] || nonce [u8; 24] || ciphertext [u8; 48]
//! ```
//!
//! Integers are little-endian. The decoder dispatches on `version`; every version ever
//! shipped stays decodable.

use alloy_primitives::Address;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use zeroize::Zeroizing;

use super::{
    account::PRIVATE_KEY_SIZE,
    crypto::{CipherParams, KdfParams, NONCE_SIZE, SALT_SIZE, SEALED_KEY_SIZE},
    EncryptedCredential, PlainCredential, TransportPayload,
};
use crate::error::{PaperWalletError, PaperWalletResult};

/// Magic bytes opening every payload.
pub const MAGIC: &[u8; 2] = b"PW";

/// Version written by this release.
pub const CURRENT_VERSION: u8 = 1;

const KIND_PLAIN: u8 = 0x01;
const KIND_ENCRYPTED: u8 = 0x02;

const KDF_ARGON2ID: u8 = 0x01;

const ADDRESS_SIZE: usize = 20;
const HEADER_SIZE: usize = MAGIC.len() + 1 + 1 + ADDRESS_SIZE;
const KDF_SIZE: usize = 1 + 4 + 4 + 4;

/// Encoded size of a version 1 plain credential.
pub const PLAIN_V1_SIZE: usize = HEADER_SIZE + PRIVATE_KEY_SIZE;

/// Encoded size of a version 1 encrypted credential.
pub const ENCRYPTED_V1_SIZE: usize =
    HEADER_SIZE + KDF_SIZE + SALT_SIZE + NONCE_SIZE + SEALED_KEY_SIZE;

fn write_header(out: &mut Vec<u8>, version: u8, kind: u8, address: &Address) {
    out.extend_from_slice(MAGIC);
    out.push(version);
    out.push(kind);
    out.extend_from_slice(address.as_slice());
}

pub(super) fn encode(payload: &TransportPayload) -> Vec<u8> {
    match payload {
        TransportPayload::Plain(plain) => {
            let mut out = Vec::with_capacity(PLAIN_V1_SIZE);
            write_header(&mut out, plain.version, KIND_PLAIN, &plain.address);
            out.extend_from_slice(&plain.private_key);
            out
        }
        TransportPayload::Encrypted(encrypted) => {
            let params = &encrypted.cipher_params;
            let mut out = Vec::with_capacity(ENCRYPTED_V1_SIZE);
            write_header(&mut out, encrypted.version, KIND_ENCRYPTED, &encrypted.address);
            out.push(KDF_ARGON2ID);
            out.extend_from_slice(&params.kdf.m_cost_kib.to_le_bytes());
            out.extend_from_slice(&params.kdf.t_cost.to_le_bytes());
            out.extend_from_slice(&params.kdf.p_cost.to_le_bytes());
            out.extend_from_slice(&params.salt);
            out.extend_from_slice(&params.nonce);
            out.extend_from_slice(&encrypted.ciphertext);
            out
        }
    }
}

pub(super) fn decode(bytes: &[u8]) -> PaperWalletResult<TransportPayload> {
    let mut reader = Reader::new(bytes);

    let magic: [u8; 2] = reader.take("magic")?;
    if &magic != MAGIC {
        return Err(PaperWalletError::malformed("not a paper wallet payload"));
    }

    match reader.u8("version")? {
        1 => decode_v1(reader),
        version => Err(PaperWalletError::malformed(format!(
            "unsupported version {version}"
        ))),
    }
}

fn decode_v1(mut reader: Reader<'_>) -> PaperWalletResult<TransportPayload> {
    let kind = reader.u8("kind")?;
    let address = Address::from(reader.take::<ADDRESS_SIZE>("address")?);

    let payload = match kind {
        KIND_PLAIN => {
            let private_key = Zeroizing::new(reader.take::<PRIVATE_KEY_SIZE>("private key")?);
            TransportPayload::Plain(PlainCredential {
                version: 1,
                address,
                private_key: *private_key,
            })
        }
        KIND_ENCRYPTED => {
            let algorithm = reader.u8("kdf algorithm")?;
            if algorithm != KDF_ARGON2ID {
                return Err(PaperWalletError::malformed(format!(
                    "unknown kdf algorithm {algorithm:#04x}"
                )));
            }
            let kdf = KdfParams {
                m_cost_kib: reader.u32("kdf memory")?,
                t_cost: reader.u32("kdf passes")?,
                p_cost: reader.u32("kdf lanes")?,
            };
            kdf.validate()?;

            let salt = reader.take::<SALT_SIZE>("salt")?;
            let nonce = reader.take::<NONCE_SIZE>("nonce")?;
            let ciphertext = reader.take::<SEALED_KEY_SIZE>("ciphertext")?;

            TransportPayload::Encrypted(EncryptedCredential {
                version: 1,
                address,
                cipher_params: CipherParams { salt, nonce, kdf },
                ciphertext: ciphertext.to_vec(),
            })
        }
        other => {
            return Err(PaperWalletError::malformed(format!(
                "unknown credential kind {other:#04x}"
            )))
        }
    };

    reader.finish()?;
    Ok(payload)
}

/// Bounds-checked cursor over an encoded payload.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self, field: &str) -> PaperWalletResult<[u8; N]> {
        let end = self
            .offset
            .checked_add(N)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| PaperWalletError::malformed(format!("truncated at {field}")))?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..end]);
        self.offset = end;
        Ok(out)
    }

    fn u8(&mut self, field: &str) -> PaperWalletResult<u8> {
        let [byte] = self.take::<1>(field)?;
        Ok(byte)
    }

    fn u32(&mut self, field: &str) -> PaperWalletResult<u32> {
        Ok(u32::from_le_bytes(self.take(field)?))
    }

    fn finish(self) -> PaperWalletResult<()> {
        let trailing = self.bytes.len() - self.offset;
        if trailing != 0 {
            return Err(PaperWalletError::malformed(format!(
                "{trailing} trailing bytes"
            )));
        }
        Ok(())
    }
}

/// Renders payload bytes as unpadded URL-safe base64, the text carried by QR codes and NFC
/// text records.
#[must_use]
pub fn encode_text(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Parses the text form produced by [`encode_text`]. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns `MalformedPayload` if `text` is not unpadded URL-safe base64.
pub fn decode_text(text: &str) -> PaperWalletResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text.trim())
        .map_err(|err| PaperWalletError::malformed(format!("invalid payload text: {err}")))
}
