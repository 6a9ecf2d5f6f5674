//! Compact JWS signing for the two store token formats.
//!
//! - RS256 assertions for the OAuth2 jwt-bearer exchange (Android publisher API).
//! - ES256 bearer tokens with a `kid` header (App Store Connect API).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::ecdsa::{Signature as EcSignature, SigningKey as EcSigningKey, signature::Signer};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::SignatureEncoding;
use serde_json::{Value, json};
use sha2::Sha256;

use crate::error::{EngineError, Result};

fn signing_input(header: &Value, claims: &Value) -> Result<String> {
    let header = serde_json::to_vec(header).map_err(|e| EngineError::Credential(e.to_string()))?;
    let claims = serde_json::to_vec(claims).map_err(|e| EngineError::Credential(e.to_string()))?;
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(claims)
    ))
}

/// Sign `claims` with an RSA PKCS#8 PEM key.
pub fn sign_rs256(private_key_pem: &str, claims: &Value) -> Result<String> {
    use rsa::pkcs8::DecodePrivateKey;

    let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| EngineError::Credential(format!("invalid RSA private key: {e}")))?;
    let signing_key = RsaSigningKey::<Sha256>::new(key);

    let header = json!({ "alg": "RS256", "typ": "JWT" });
    let input = signing_input(&header, claims)?;
    let sig = signing_key.sign(input.as_bytes());

    Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(sig.to_bytes())))
}

/// Sign `claims` with a P-256 PKCS#8 PEM key (the `.p8` format).
pub fn sign_es256(private_key_pem: &str, key_id: &str, claims: &Value) -> Result<String> {
    use p256::pkcs8::DecodePrivateKey;

    let key = EcSigningKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| EngineError::Credential(format!("invalid EC private key: {e}")))?;

    let header = json!({ "alg": "ES256", "kid": key_id, "typ": "JWT" });
    let input = signing_input(&header, claims)?;
    let sig: EcSignature = key.sign(input.as_bytes());

    Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(sig.to_bytes())))
}
