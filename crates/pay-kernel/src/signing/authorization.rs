use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::{RngCore, SeedableRng};

use super::signer::RequestSigner;
use crate::error::{PaymentError, Result};

/// Scheme token that opens every `Authorization` header.
pub const AUTH_SCHEME: &str = "WECHATPAY2-SHA256-RSA2048";

const NONCE_BYTES: usize = 16;

/// The request material covered by a signature.
#[derive(Debug, Clone, Copy)]
pub struct RequestSignChain<'a> {
    pub method: &'a str,
    /// Path plus query, exactly as dispatched.
    pub canonical_url: &'a str,
    /// Serialized body, empty for GET.
    pub sign_body: &'a str,
}

/// Builds the provider's string-to-sign: method, canonical URL, timestamp,
/// nonce and body, each terminated by `\n`.
pub fn string_to_sign(chain: &RequestSignChain<'_>, timestamp: i64, nonce: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n",
        chain.method.to_ascii_uppercase(),
        chain.canonical_url,
        timestamp,
        nonce,
        chain.sign_body,
    )
}

/// Turns a [`RequestSignChain`] into an `Authorization` header value.
///
/// Holds only identity fields and a shared signer; timestamp and nonce are
/// produced per call, so one instance can serve concurrent requests.
#[derive(Clone)]
pub struct Authorizer {
    mch_id: String,
    serial_no: String,
    signer: Arc<dyn RequestSigner>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("mch_id", &self.mch_id)
            .field("serial_no", &self.serial_no)
            .field("algorithm", &self.signer.algorithm())
            .finish()
    }
}

impl Authorizer {
    pub fn new(
        mch_id: impl Into<String>,
        serial_no: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            mch_id: mch_id.into(),
            serial_no: serial_no.into(),
            signer,
        }
    }

    pub fn mch_id(&self) -> &str {
        &self.mch_id
    }

    /// Signs with the current time and a fresh nonce.
    pub fn authorize(&self, chain: &RequestSignChain<'_>) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = generate_nonce();
        self.authorize_with(chain, timestamp, &nonce)
    }

    /// Signs with caller-provided timestamp and nonce.
    pub fn authorize_with(
        &self,
        chain: &RequestSignChain<'_>,
        timestamp: i64,
        nonce: &str,
    ) -> Result<String> {
        self.signer
            .prepare()
            .map_err(|e| PaymentError::Configuration(format!("{e:#}")))?;

        let message = string_to_sign(chain, timestamp, nonce);
        let signature = self
            .signer
            .sign(message.as_bytes())
            .map_err(|e| PaymentError::Signing(format!("{e:#}")))?;

        Ok(format!(
            r#"{AUTH_SCHEME} mchid="{}",nonce_str="{}",timestamp="{}",serial_no="{}",signature="{}""#,
            self.mch_id,
            nonce,
            timestamp,
            self.serial_no,
            BASE64.encode(signature),
        ))
    }
}

fn generate_nonce() -> String {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
