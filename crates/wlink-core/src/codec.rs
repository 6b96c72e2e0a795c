//! URL parameter codec for wallet messages.
//!
//! Every top-level message field becomes one query parameter whose value is
//! the field's JSON encoding. A request URL is the wallet's URL with these
//! parameters appended; a response arrives as the query of the return deep
//! link.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use url::{form_urlencoded, Url};
use wlink_crypto::{decrypt, encrypt, CryptoError, EncryptedData, SharedSecret};

use crate::message::{EncryptedContent, RpcRequestMessage, RpcResponseMessage};

const REQUEST_FIELDS: &[&str] = &["id", "sender", "content", "timestamp", "callbackUrl", "sdkVersion"];
const RESPONSE_FIELDS: &[&str] = &["id", "requestId", "sender", "content", "timestamp"];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("payload crypto failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("payload json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Query encoding
// ============================================================================

fn encode_params<T: Serialize>(message: &T) -> Result<Vec<(String, String)>, CodecError> {
    match serde_json::to_value(message)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| (name, value.to_string()))
            .collect()),
        other => Err(CodecError::Malformed(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn decode_params<T: DeserializeOwned>(query: &str, fields_list: &[&str]) -> Result<T, CodecError> {
    let query = query.strip_prefix('?').unwrap_or(query);

    let mut fields = Map::new();
    for (name, raw) in form_urlencoded::parse(query.as_bytes()) {
        // Parameters the wallet URL already carried are not ours.
        if !fields_contain(fields_list, &name) {
            continue;
        }
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| CodecError::InvalidParameter {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        fields.insert(name.into_owned(), value);
    }

    if let Some(missing) = fields_list.iter().find(|name| !fields.contains_key(**name)) {
        return Err(CodecError::MissingParameter(missing.to_string()));
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| CodecError::Malformed(e.to_string()))
}

fn fields_contain(fields: &[&str], name: &str) -> bool {
    fields.iter().any(|f| *f == name)
}

/// Encode a request as a query string (without a leading `?`).
pub fn encode_request_url_params(request: &RpcRequestMessage) -> Result<String, CodecError> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in encode_params(request)? {
        serializer.append_pair(&name, &value);
    }
    Ok(serializer.finish())
}

/// Decode a request from a query string.
pub fn decode_request_url_params(query: &str) -> Result<RpcRequestMessage, CodecError> {
    decode_params(query, REQUEST_FIELDS)
}

/// Encode a response as a query string (without a leading `?`).
pub fn encode_response_url_params(response: &RpcResponseMessage) -> Result<String, CodecError> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in encode_params(response)? {
        serializer.append_pair(&name, &value);
    }
    Ok(serializer.finish())
}

/// Decode a response from a query string. A leading `?` is accepted.
pub fn decode_response_url_params(query: &str) -> Result<RpcResponseMessage, CodecError> {
    decode_params(query, RESPONSE_FIELDS)
}

/// The wallet URL with the request's parameters appended to any query it
/// already has.
pub fn build_request_url(wallet_url: &Url, request: &RpcRequestMessage) -> Result<Url, CodecError> {
    let params = encode_params(request)?;
    let mut url = wallet_url.clone();
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Decode the response carried by a return deep link.
pub fn response_from_url(link: &str) -> Result<RpcResponseMessage, CodecError> {
    let url = Url::parse(link).map_err(|e| CodecError::InvalidUrl(format!("{}: {}", link, e)))?;
    let query = url
        .query()
        .ok_or_else(|| CodecError::MissingParameter("query".into()))?;
    decode_response_url_params(query)
}

/// Build the return deep link for a response.
pub fn response_url(callback_url: &str, response: &RpcResponseMessage) -> Result<Url, CodecError> {
    let mut url = Url::parse(callback_url)
        .map_err(|e| CodecError::InvalidUrl(format!("{}: {}", callback_url, e)))?;
    let params = encode_params(response)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

// ============================================================================
// Sealed payloads
// ============================================================================

/// Serialize `payload` to JSON and seal it.
pub fn encrypt_content<T: Serialize>(
    secret: &SharedSecret,
    payload: &T,
) -> Result<EncryptedData, CodecError> {
    let plaintext = serde_json::to_vec(payload)?;
    Ok(encrypt(secret, &plaintext)?)
}

/// Open `content` and deserialize its JSON plaintext.
pub fn decrypt_content<T: DeserializeOwned>(
    secret: &SharedSecret,
    content: &EncryptedContent,
) -> Result<T, CodecError> {
    let data = encrypted_data(content)?;
    let plaintext = decrypt(secret, &data)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Hex-decode wire content back into cipher input.
pub fn encrypted_data(content: &EncryptedContent) -> Result<EncryptedData, CodecError> {
    let iv_bytes = hex::decode(&content.iv).map_err(|e| CodecError::InvalidParameter {
        name: "iv".into(),
        reason: e.to_string(),
    })?;
    let iv: [u8; wlink_crypto::cipher::IV_LEN] =
        iv_bytes
            .try_into()
            .map_err(|v: Vec<u8>| CodecError::InvalidParameter {
                name: "iv".into(),
                reason: format!("expected 12 bytes, got {}", v.len()),
            })?;
    let cipher_text = hex::decode(&content.cipher_text).map_err(|e| CodecError::InvalidParameter {
        name: "cipherText".into(),
        reason: e.to_string(),
    })?;
    Ok(EncryptedData { iv, cipher_text })
}
