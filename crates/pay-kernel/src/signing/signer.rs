/// Trait for producing raw signatures over a request's string-to-sign.
///
/// Implementations are sync — signing is CPU-bound.
/// For async backends (e.g. an HSM), use `spawn_blocking`.
pub trait RequestSigner: Send + Sync {
    /// Resolve key material ahead of signing.
    ///
    /// Failures here are credential problems rather than signing problems.
    fn prepare(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Sign the message bytes. Returns raw signature bytes.
    fn sign(&self, message: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Algorithm identifier string (e.g. "rsa-pkcs1v15-sha256").
    fn algorithm(&self) -> &str;
}
