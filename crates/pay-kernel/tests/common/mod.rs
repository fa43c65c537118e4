#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::StatusCode;
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use pay_kernel::signing::{AUTH_SCHEME, RequestSignChain, string_to_sign};
use pay_kernel::{
    BaseClient, Config, PaymentError, PreparedRequest, ResponseEnvelope, Result, RsaSigner,
    Transport,
};

pub const APP_ID: &str = "wxd678efh567hg6787";
pub const MCH_ID: &str = "1230000109";
pub const SERIAL_NO: &str = "5157F09EFDC096DE15EBE81A47057A72";

pub fn test_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let hash = Sha256::digest(b"pay-kernel-integration");
        let mut rng = ChaCha20Rng::from_seed(hash.into());
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    })
    .clone()
}

pub fn test_config() -> Config {
    Config::new(APP_ID, MCH_ID, SERIAL_NO, "/unused/apiclient_key.pem")
}

pub fn client_with(
    config: Config,
    transport: RecordingTransport,
) -> BaseClient<RecordingTransport> {
    let signer = Arc::new(RsaSigner::from_private_key(test_key()));
    BaseClient::with_signer(config, transport, signer).unwrap()
}

/// Parses `SCHEME k="v",k="v"` into its fields.
pub fn authorization_fields(header: &str) -> HashMap<String, String> {
    let params = header
        .strip_prefix(AUTH_SCHEME)
        .and_then(|rest| rest.strip_prefix(' '))
        .expect("authorization starts with the scheme");
    params
        .split(',')
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap();
            (k.to_string(), v.trim_matches('"').to_string())
        })
        .collect()
}

/// Checks the request's signature against the exact bytes it will send.
pub fn verify_signature(request: &PreparedRequest) {
    verify_wire_signature(
        request.method.as_str(),
        &request.canonical_url,
        request.body.as_deref().unwrap_or(""),
        request.authorization().expect("signed"),
    );
}

/// Rebuilds the signed message from what a server received and checks the
/// `Authorization` header against it.
pub fn verify_wire_signature(
    method: &str,
    path_and_query: &str,
    body: &str,
    authorization: &str,
) {
    let fields = authorization_fields(authorization);
    assert_eq!(fields["mchid"], MCH_ID);
    assert_eq!(fields["serial_no"], SERIAL_NO);

    let chain = RequestSignChain {
        method,
        canonical_url: path_and_query,
        sign_body: body,
    };
    let timestamp: i64 = fields["timestamp"].parse().unwrap();
    let message = string_to_sign(&chain, timestamp, &fields["nonce_str"]);

    let signature_bytes = BASE64.decode(&fields["signature"]).unwrap();
    let signature = Signature::try_from(signature_bytes.as_slice()).unwrap();
    VerifyingKey::<Sha256>::new(test_key().to_public_key())
        .verify(message.as_bytes(), &signature)
        .expect("signature covers the dispatched request");
}

/// In-memory transport that records what it is asked to send.
pub struct RecordingTransport {
    requests: Mutex<Vec<PreparedRequest>>,
    response: ResponseEnvelope,
    download: Vec<u8>,
    fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn responding(body: &'static str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            response: ResponseEnvelope::new(StatusCode::OK, body),
            download: Vec::new(),
            fail_after: None,
        }
    }

    pub fn serving_file(content: &[u8]) -> Self {
        Self {
            download: content.to_vec(),
            ..Self::responding("")
        }
    }

    /// Fails with a connection reset once `bytes` body bytes have been sent.
    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> PreparedRequest {
        self.requests().pop().expect("a request was dispatched")
    }

    fn record(&self, request: &PreparedRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }

    fn reset() -> PaymentError {
        PaymentError::transport(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
    }
}

impl Transport for RecordingTransport {
    async fn dispatch(&self, request: &PreparedRequest) -> Result<ResponseEnvelope> {
        self.record(request);
        if self.fail_after.is_some() {
            return Err(Self::reset());
        }
        Ok(self.response.clone())
    }

    async fn stream_to<W>(&self, request: &PreparedRequest, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.record(request);
        let limit = self.fail_after.unwrap_or(self.download.len()).min(self.download.len());
        let mut written = 0u64;
        for chunk in self.download[..limit].chunks(1024) {
            sink.write_all(chunk).await.map_err(PaymentError::sink)?;
            written += chunk.len() as u64;
        }
        sink.flush().await.map_err(PaymentError::sink)?;
        if self.fail_after.is_some() {
            return Err(Self::reset());
        }
        Ok(written)
    }
}

/// Sink that rejects every write as if the disk were full.
pub struct FullDisk;

impl AsyncWrite for FullDisk {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::StorageFull,
            "no space left on device",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
