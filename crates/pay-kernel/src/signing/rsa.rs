use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;

use super::signer::RequestSigner;

/// RSA PKCS#1 v1.5 signer with SHA-256 digest.
///
/// When built from a path the PEM file is read on first use and the parsed
/// key is cached for the lifetime of the signer.
pub struct RsaSigner {
    key_path: Option<PathBuf>,
    signing_key: OnceLock<SigningKey<Sha256>>,
}

impl RsaSigner {
    pub fn from_path(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: Some(key_path.into()),
            signing_key: OnceLock::new(),
        }
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self::from_private_key(parse_private_key(pem)?))
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let signing_key = OnceLock::new();
        let _ = signing_key.set(SigningKey::<Sha256>::new(private_key));
        Self {
            key_path: None,
            signing_key,
        }
    }

    fn signing_key(&self) -> Result<&SigningKey<Sha256>> {
        if let Some(key) = self.signing_key.get() {
            return Ok(key);
        }
        let path = self
            .key_path
            .as_ref()
            .context("no private key configured")?;
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("reading private key {}", path.display()))?;
        let private_key = parse_private_key(&pem)
            .with_context(|| format!("parsing private key {}", path.display()))?;
        // A concurrent caller may have won the race; either key is identical.
        Ok(self
            .signing_key
            .get_or_init(|| SigningKey::<Sha256>::new(private_key)))
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| anyhow!("not a PKCS#8 or PKCS#1 RSA private key: {e}"))
}

impl RequestSigner for RsaSigner {
    fn prepare(&self) -> Result<()> {
        self.signing_key().map(|_| ())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key()?
            .try_sign(message)
            .context("computing RSA signature")?;
        Ok(signature.to_vec())
    }

    fn algorithm(&self) -> &str {
        "rsa-pkcs1v15-sha256"
    }
}
