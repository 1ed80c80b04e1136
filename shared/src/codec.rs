//! Payload codec for published readings
//!
//! Readings are serialized as compact JSON. In encrypted mode the JSON bytes
//! are sealed as:
//! ```text
//! base64( AES-256-CBC( key, iv, PKCS#7( json ) ) )
//! ```
//!
//! Key and IV are fixed for the whole process, so the consumer decrypts every
//! message with the same pair. The JSON must stay compact: the consumer
//! parses exactly the bytes that were padded and encrypted here.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::Serialize;
use thiserror::Error;

use crate::ConfigError;

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// CBC initialization vector length in bytes
pub const IV_LEN: usize = 16;

/// AES block size; ciphertexts are always a multiple of this
pub const BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Cipher error: {0}")]
    Cipher(String),
}

/// Fixed AES-256-CBC key and IV
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl CipherKey {
    /// Build a key from raw bytes, validating both lengths
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, ConfigError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| ConfigError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| ConfigError::InvalidIvLength {
            expected: IV_LEN,
            actual: iv.len(),
        })?;
        Ok(Self { key, iv })
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Whether payloads are sent as plain JSON or sealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CodecMode {
    #[default]
    Plain,
    Encrypted(CipherKey),
}

/// A transport-ready payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    /// Compact JSON bytes
    Json(Bytes),
    /// Base64 text of the AES-256-CBC ciphertext
    Sealed(String),
}

impl EncodedMessage {
    /// Raw bytes to put on the wire
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Json(bytes) => &bytes[..],
            Self::Sealed(text) => text.as_bytes(),
        }
    }

    /// MIME type for HTTP bodies
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::Sealed(_) => "text/plain",
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serializes readings and optionally encrypts them
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
    mode: CodecMode,
}

impl PayloadCodec {
    pub fn new(mode: CodecMode) -> Self {
        Self { mode }
    }

    /// Check if payloads are encrypted
    pub fn is_encrypted(&self) -> bool {
        matches!(self.mode, CodecMode::Encrypted(_))
    }

    /// Encode a value into a transport-ready message
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncodedMessage, CodecError> {
        let json = serde_json::to_vec(value)?;

        match &self.mode {
            CodecMode::Plain => Ok(EncodedMessage::Json(Bytes::from(json))),
            CodecMode::Encrypted(key) => Ok(EncodedMessage::Sealed(seal(key, &json)?)),
        }
    }

    /// Recover the JSON bytes of an encoded message
    pub fn open(&self, message: &EncodedMessage) -> Result<Vec<u8>, CodecError> {
        match (&self.mode, message) {
            (_, EncodedMessage::Json(bytes)) => Ok(bytes.to_vec()),
            (CodecMode::Encrypted(key), EncodedMessage::Sealed(text)) => unseal(key, text),
            (CodecMode::Plain, EncodedMessage::Sealed(_)) => Err(CodecError::Cipher(
                "sealed payload but no key configured".into(),
            )),
        }
    }
}

/// Encrypt and base64-encode a plaintext
pub fn seal(key: &CipherKey, plaintext: &[u8]) -> Result<String, CodecError> {
    let cipher = Aes256CbcEnc::new_from_slices(&key.key, &key.iv)
        .map_err(|e| CodecError::Cipher(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok(STANDARD.encode(ciphertext))
}

/// Base64-decode, decrypt and unpad a sealed payload
pub fn unseal(key: &CipherKey, sealed: &str) -> Result<Vec<u8>, CodecError> {
    let ciphertext = STANDARD.decode(sealed)?;
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CodecError::Cipher(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(&key.key, &key.iv)
        .map_err(|e| CodecError::Cipher(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| CodecError::Cipher(e.to_string()))
}
