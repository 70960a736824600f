//! Credential decryption for stored database profiles.
//!
//! Every encrypted column of a database profile has its own AES-256-CBC
//! key/IV pair. The pairs are read once at startup into [`CredentialKeys`]
//! and handed to a [`CredentialCodec`]; nothing here touches the process
//! environment after that.

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// The encrypted columns of a database profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialField {
    Host,
    Database,
    Username,
    Password,
    ConnectString,
}

impl CredentialField {
    pub const ALL: [CredentialField; 5] = [
        Self::Host,
        Self::Database,
        Self::Username,
        Self::Password,
        Self::ConnectString,
    ];

    /// Fields every deployment must have keys for.
    pub const REQUIRED: [CredentialField; 4] =
        [Self::Host, Self::Database, Self::Username, Self::Password];

    /// Environment variable holding the encryption key for this field.
    pub fn key_env(&self) -> &'static str {
        match self {
            Self::Host => "DATABASES_HOST_ENCRYPTION_KEY",
            Self::Database => "DATABASES_DATABASE_ENCRYPTION_KEY",
            Self::Username => "DATABASES_USERNAME_ENCRYPTION_KEY",
            Self::Password => "DATABASES_PASSWORD_ENCRYPTION_KEY",
            Self::ConnectString => "DATABASES_CONNECT_STRING_ENCRYPTION_KEY",
        }
    }

    /// Environment variable holding the IV for this field.
    pub fn iv_env(&self) -> &'static str {
        match self {
            Self::Host => "DATABASES_HOST_IV_STRING",
            Self::Database => "DATABASES_DATABASE_IV_STRING",
            Self::Username => "DATABASES_USERNAME_IV_STRING",
            Self::Password => "DATABASES_PASSWORD_IV_STRING",
            Self::ConnectString => "DATABASES_CONNECT_STRING_IV_STRING",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Database => "database",
            Self::Username => "username",
            Self::Password => "password",
            Self::ConnectString => "connect_string",
        }
    }

    /// Parses a field name as used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "host" => Some(Self::Host),
            "database" => Some(Self::Database),
            "username" | "user" => Some(Self::Username),
            "password" => Some(Self::Password),
            "connect_string" => Some(Self::ConnectString),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decrypted credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the plaintext. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Key material for one field.
#[derive(Clone)]
pub struct FieldKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl FieldKey {
    /// Builds a key pair from its textual configuration values.
    ///
    /// Each value is either raw text of the exact byte length (32 for the key,
    /// 16 for the IV) or the hex encoding of those bytes.
    pub fn parse(key: &str, iv: &str) -> Result<Self> {
        Ok(Self {
            key: parse_material::<KEY_LEN>(key, "key")?,
            iv: parse_material::<IV_LEN>(iv, "IV")?,
        })
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldKey(****)")
    }
}

fn parse_material<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let bytes = if value.len() == N {
        value.as_bytes().to_vec()
    } else if value.len() == N * 2 {
        hex::decode(value)
            .map_err(|e| GatewayError::config(format!("Invalid hex in encryption {what}: {e}")))?
    } else {
        return Err(GatewayError::config(format!(
            "Encryption {what} must be {N} bytes of text or {} hex characters, got {} characters",
            N * 2,
            value.len()
        )));
    };

    bytes
        .try_into()
        .map_err(|_| GatewayError::config(format!("Encryption {what} has the wrong length")))
}

/// The full per-field key set, assembled once at process start.
#[derive(Debug, Clone, Default)]
pub struct CredentialKeys {
    keys: HashMap<CredentialField, FieldKey>,
}

impl CredentialKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every key/IV pair from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every key/IV pair through the given lookup.
    ///
    /// A field with neither variable set is left unconfigured; a field with
    /// only one of the two set is a configuration error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut keys = Self::new();

        for field in CredentialField::ALL {
            match (lookup(field.key_env()), lookup(field.iv_env())) {
                (Some(key), Some(iv)) => {
                    let parsed = FieldKey::parse(&key, &iv).map_err(|e| {
                        GatewayError::config(format!("{} ({})", e, field.key_env()))
                    })?;
                    keys.keys.insert(field, parsed);
                }
                (None, None) => {}
                (Some(_), None) => {
                    return Err(GatewayError::config(format!(
                        "{} is set but {} is missing",
                        field.key_env(),
                        field.iv_env()
                    )))
                }
                (None, Some(_)) => {
                    return Err(GatewayError::config(format!(
                        "{} is set but {} is missing",
                        field.iv_env(),
                        field.key_env()
                    )))
                }
            }
        }

        Ok(keys)
    }

    /// Adds or replaces the key pair for a field.
    pub fn with_field(mut self, field: CredentialField, key: FieldKey) -> Self {
        self.keys.insert(field, key);
        self
    }

    pub fn get(&self, field: CredentialField) -> Option<&FieldKey> {
        self.keys.get(&field)
    }

    /// Fields without a configured key pair.
    pub fn missing_fields(&self) -> Vec<CredentialField> {
        CredentialField::ALL
            .into_iter()
            .filter(|f| !self.keys.contains_key(f))
            .collect()
    }

    /// Fails if any of the given fields has no key pair.
    pub fn require(&self, fields: &[CredentialField]) -> Result<()> {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|f| !self.keys.contains_key(f))
            .map(|f| f.key_env())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Missing encryption keys: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Text encoding of stored ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiphertextEncoding {
    #[default]
    Hex,
    Base64,
}

/// Encrypts and decrypts profile fields with their per-field key pairs.
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    keys: CredentialKeys,
    encoding: CiphertextEncoding,
}

impl CredentialCodec {
    pub fn new(keys: CredentialKeys, encoding: CiphertextEncoding) -> Self {
        Self { keys, encoding }
    }

    pub fn keys(&self) -> &CredentialKeys {
        &self.keys
    }

    /// Decrypts a stored ciphertext for the given field.
    pub fn decrypt(&self, field: CredentialField, ciphertext: &[u8]) -> Result<Secret> {
        let key = self.key_for(field)?;

        let text = std::str::from_utf8(ciphertext).map_err(|_| {
            GatewayError::decryption(format!("Ciphertext for {field} is not valid text"))
        })?;
        let raw = self.decode(text.trim()).map_err(|e| {
            GatewayError::decryption(format!("Ciphertext for {field} is malformed: {e}"))
        })?;

        let plaintext = Aes256CbcDec::new_from_slices(&key.key, &key.iv)
            .map_err(|e| GatewayError::config(format!("Invalid key for {field}: {e}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(&raw)
            .map_err(|_| {
                GatewayError::decryption(format!(
                    "Ciphertext for {field} could not be decrypted (wrong key or corrupt data)"
                ))
            })?;

        String::from_utf8(plaintext)
            .map(Secret)
            .map_err(|_| GatewayError::decryption(format!("Plaintext for {field} is not UTF-8")))
    }

    /// Encrypts a plaintext value for storage, returning the encoded ciphertext bytes.
    pub fn encrypt(&self, field: CredentialField, plaintext: &str) -> Result<Vec<u8>> {
        let key = self.key_for(field)?;

        let raw = Aes256CbcEnc::new_from_slices(&key.key, &key.iv)
            .map_err(|e| GatewayError::config(format!("Invalid key for {field}: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(self.encode(&raw).into_bytes())
    }

    fn key_for(&self, field: CredentialField) -> Result<&FieldKey> {
        self.keys.get(field).ok_or_else(|| {
            GatewayError::config(format!(
                "No encryption key configured for {field} ({} / {})",
                field.key_env(),
                field.iv_env()
            ))
        })
    }

    fn decode(&self, text: &str) -> std::result::Result<Vec<u8>, String> {
        match self.encoding {
            CiphertextEncoding::Hex => hex::decode(text).map_err(|e| e.to_string()),
            CiphertextEncoding::Base64 => STANDARD.decode(text).map_err(|e| e.to_string()),
        }
    }

    fn encode(&self, raw: &[u8]) -> String {
        match self.encoding {
            CiphertextEncoding::Hex => hex::encode(raw),
            CiphertextEncoding::Base64 => STANDARD.encode(raw),
        }
    }
}
