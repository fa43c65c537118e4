use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use tokio::io::AsyncWrite;

use crate::error::Result;

/// TLS client identity presented by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// A fully assembled request, already signed.
///
/// `canonical_url` is the string covered by the signature and also the
/// path the transport puts on the wire. It always starts with `/`.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Scheme and authority for absolute URLs; `None` means the transport's base URI.
    pub origin: Option<String>,
    pub canonical_url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub client_cert: Option<ClientCert>,
}

impl PreparedRequest {
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("Authorization").map(String::as_str)
    }

    /// Absolute URL to dispatch to.
    ///
    /// Only the scheme and authority of `base_uri` are used; the path on the
    /// wire is `canonical_url` byte for byte.
    pub fn url(&self, base_uri: &str) -> String {
        match &self.origin {
            Some(origin) => format!("{origin}{}", self.canonical_url),
            None => format!("{}{}", origin_of(base_uri), self.canonical_url),
        }
    }
}

fn origin_of(base_uri: &str) -> String {
    match base_uri.parse::<Uri>() {
        Ok(uri) => match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}"),
            _ => base_uri.trim_end_matches('/').to_string(),
        },
        Err(_) => base_uri.trim_end_matches('/').to_string(),
    }
}

/// Raw response as returned by a transport.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Executes prepared requests.
///
/// Implementations own sockets, TLS and timeouts. They do not interpret
/// status codes; network errors are reported as
/// [`PaymentError::Transport`](crate::PaymentError::Transport).
pub trait Transport: Send + Sync {
    /// Send the request and buffer the full response.
    fn dispatch(
        &self,
        request: &PreparedRequest,
    ) -> impl Future<Output = Result<ResponseEnvelope>> + Send;

    /// Send the request and copy the response body into `sink` chunk by chunk.
    ///
    /// Returns the number of body bytes written. Failures writing to `sink`
    /// are local faults and must be reported with
    /// [`PaymentError::sink`](crate::PaymentError::sink).
    fn stream_to<W>(
        &self,
        request: &PreparedRequest,
        sink: &mut W,
    ) -> impl Future<Output = Result<u64>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::config::DEFAULT_BASE_URI;
    use crate::error::PaymentError;

    /// Production transport backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        base_uri: String,
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new(DEFAULT_BASE_URI)
        }
    }

    impl ReqwestTransport {
        pub fn new(base_uri: impl Into<String>) -> Self {
            Self::with_client(reqwest::Client::new(), base_uri)
        }

        pub fn with_client(client: reqwest::Client, base_uri: impl Into<String>) -> Self {
            Self {
                client,
                base_uri: base_uri.into(),
            }
        }

        async fn client_for(&self, cert: Option<&ClientCert>) -> Result<reqwest::Client> {
            let Some(cert) = cert else {
                return Ok(self.client.clone());
            };
            let cert_pem = tokio::fs::read(&cert.cert_path)
                .await
                .map_err(|e| PaymentError::io(&cert.cert_path, e))?;
            let key_pem = tokio::fs::read(&cert.key_path)
                .await
                .map_err(|e| PaymentError::io(&cert.key_path, e))?;
            let identity = reqwest::Identity::from_pkcs8_pem(&cert_pem, &key_pem)
                .map_err(|e| PaymentError::Configuration(format!("client certificate: {e}")))?;
            reqwest::Client::builder()
                .identity(identity)
                .build()
                .map_err(PaymentError::transport)
        }

        async fn send(&self, request: &PreparedRequest) -> Result<reqwest::Response> {
            let client = self.client_for(request.client_cert.as_ref()).await?;
            let mut builder = client.request(request.method.clone(), request.url(&self.base_uri));
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            builder.send().await.map_err(PaymentError::transport)
        }
    }

    impl Transport for ReqwestTransport {
        async fn dispatch(&self, request: &PreparedRequest) -> Result<ResponseEnvelope> {
            let response = self.send(request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(PaymentError::transport)?;
            Ok(ResponseEnvelope {
                status,
                headers,
                body,
            })
        }

        async fn stream_to<W>(&self, request: &PreparedRequest, sink: &mut W) -> Result<u64>
        where
            W: AsyncWrite + Unpin + Send,
        {
            let response = self.send(request).await?;
            let mut stream = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(PaymentError::transport)?;
                sink.write_all(&chunk).await.map_err(PaymentError::sink)?;
                written += chunk.len() as u64;
            }
            sink.flush().await.map_err(PaymentError::sink)?;
            Ok(written)
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestTransport;
