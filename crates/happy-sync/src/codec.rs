//! Base64 text framing over an [`Encryptor`]; the relay carries ciphertext as strings.

use happy_crypto::encoding::{from_base64, to_base64};
use happy_crypto::{CryptoError, Encryptor};
use serde::{de::DeserializeOwned, Serialize};

pub(crate) fn seal_text<E: Encryptor, T: Serialize>(
    encryptor: &E,
    value: &T,
) -> Result<String, CryptoError> {
    Ok(to_base64(&encryptor.encrypt_one(value)?))
}

pub(crate) fn open_text<E: Encryptor, T: DeserializeOwned>(encryptor: &E, text: &str) -> Option<T> {
    let envelope = from_base64(text).ok()?;
    encryptor.decrypt_one(&envelope)
}
