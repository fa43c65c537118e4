use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use http::{Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{PaymentError, Result};
use crate::options::{JsonMap, RequestOptions, canonical_query, merge, prune_empty};
use crate::response::{Reply, ResponseShape, cast, cast_typed};
use crate::signing::{Authorizer, RequestSignChain, RequestSigner, RsaSigner};
use crate::transport::{ClientCert, PreparedRequest, ResponseEnvelope, Transport};

#[cfg(feature = "reqwest")]
use crate::transport::ReqwestTransport;

/// Path prefix of the provider's sandbox environment.
pub const SANDBOX_PREFIX: &str = "sandboxnew/";

/// Query parameters of a signed request.
pub type Query = BTreeMap<String, String>;

/// Request assembler for the payment API.
///
/// Configuration and signer are fixed at construction and only read
/// afterwards, so a client can be shared across tasks behind an `Arc`.
pub struct BaseClient<T> {
    config: Arc<Config>,
    authorizer: Authorizer,
    transport: T,
    prepends: JsonMap,
}

#[cfg(feature = "reqwest")]
impl BaseClient<ReqwestTransport> {
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.base_uri.clone());
        Self::new(config, transport)
    }
}

impl<T: Transport> BaseClient<T> {
    /// Builds a client signing with the RSA key at `config.key_path`.
    ///
    /// The key is read on the first request, not here.
    pub fn new(config: Config, transport: T) -> Result<Self> {
        let signer = Arc::new(RsaSigner::from_path(&config.key_path));
        Self::with_signer(config, transport, signer)
    }

    pub fn with_signer(
        config: Config,
        transport: T,
        signer: Arc<dyn RequestSigner>,
    ) -> Result<Self> {
        config.validate()?;
        let authorizer = Authorizer::new(&config.mch_id, &config.serial_no, signer);
        Ok(Self {
            config: Arc::new(config),
            authorizer,
            transport,
            prepends: JsonMap::new(),
        })
    }

    /// Fields merged between the identity fields and the caller's body.
    pub fn with_prepends(mut self, prepends: JsonMap) -> Self {
        self.prepends = prepends;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Prefixes `endpoint` with the sandbox path when sandbox mode is on.
    ///
    /// Absolute URLs and already-prefixed endpoints are returned unchanged.
    pub fn wrap<'a>(&self, endpoint: &'a str) -> Cow<'a, str> {
        if !self.config.sandbox || is_absolute(endpoint) {
            return Cow::Borrowed(endpoint);
        }
        let (slash, path) = match endpoint.strip_prefix('/') {
            Some(path) => ("/", path),
            None => ("", endpoint),
        };
        if path.starts_with(SANDBOX_PREFIX) {
            Cow::Borrowed(endpoint)
        } else {
            Cow::Owned(format!("{slash}{SANDBOX_PREFIX}{path}"))
        }
    }

    fn base_fields(&self) -> JsonMap {
        let mut base = JsonMap::new();
        base.insert("appid".into(), Value::String(self.config.app_id.clone()));
        base.insert("mchid".into(), Value::String(self.config.mch_id.clone()));
        base
    }

    /// Signs a request on the authenticated path without sending it.
    ///
    /// Identity fields are merged under the caller's body and the query is
    /// folded into the canonical URL before signing.
    pub fn auth_sign_request(
        &self,
        endpoint: &str,
        method: Method,
        params: Option<&Query>,
        options: RequestOptions,
    ) -> Result<PreparedRequest> {
        let base = self.base_fields();
        self.prepare(endpoint, params, method, Some(&base), options)
    }

    fn prepare(
        &self,
        endpoint: &str,
        params: Option<&Query>,
        method: Method,
        base: Option<&JsonMap>,
        options: RequestOptions,
    ) -> Result<PreparedRequest> {
        let (origin, mut canonical_url) = split_origin(&self.wrap(endpoint))?;
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            let separator = if canonical_url.contains('?') { '&' } else { '?' };
            canonical_url.push(separator);
            canonical_url.push_str(&canonical_query(params));
        }
        let method = normalize_method(method);

        let payload = prune_empty(merge([base, Some(&self.prepends), Some(&options.body)]));
        let sign_body = if method.as_str().eq_ignore_ascii_case("GET") {
            String::new()
        } else {
            serde_json::to_string(&payload)?
        };

        let authorization = self.authorizer.authorize(&RequestSignChain {
            method: method.as_str(),
            canonical_url: &canonical_url,
            sign_body: &sign_body,
        })?;

        debug!(
            method = %method,
            canonical_url = %canonical_url,
            signed_body = !sign_body.is_empty(),
            "prepared signed request"
        );

        let mut headers = BTreeMap::from([("Accept".to_string(), "application/json".to_string())]);
        if !sign_body.is_empty() {
            headers.insert("Content-Type".into(), "application/json".into());
        }
        headers.extend(options.headers);
        headers.insert("Authorization".into(), authorization);

        Ok(PreparedRequest {
            method,
            origin,
            canonical_url,
            headers,
            body: (!sign_body.is_empty()).then_some(sign_body),
            client_cert: options.client_cert,
        })
    }

    async fn finish<R: DeserializeOwned>(
        &self,
        prepared: PreparedRequest,
        return_raw: bool,
        shape: ResponseShape,
    ) -> Result<Reply<R>> {
        let envelope = self.transport.dispatch(&prepared).await?;
        if return_raw {
            return Ok(Reply::Raw(envelope));
        }
        Ok(Reply::Casted(cast(envelope, shape)?))
    }

    /// Sends a signed request without identity fields or query folding.
    pub async fn plain_request<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        options: RequestOptions,
        return_raw: bool,
    ) -> Result<Reply<R>> {
        let prepared = self.prepare(endpoint, None, method, None, options)?;
        self.finish(prepared, return_raw, self.config.response_type).await
    }

    /// Sends a signed request carrying `appid`/`mchid` and the canonical query.
    ///
    /// Unless `return_raw` is set, the body is cast to the configured shape.
    pub async fn request<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&Query>,
        method: Method,
        options: RequestOptions,
        return_raw: bool,
    ) -> Result<Reply<R>> {
        let prepared = self.auth_sign_request(endpoint, method, params, options)?;
        self.finish(prepared, return_raw, self.config.response_type).await
    }

    pub async fn request_raw(
        &self,
        endpoint: &str,
        params: Option<&Query>,
        method: Method,
        options: RequestOptions,
    ) -> Result<ResponseEnvelope> {
        let prepared = self.auth_sign_request(endpoint, method, params, options)?;
        self.transport.dispatch(&prepared).await
    }

    /// Signed request cast to a generic map whatever the configured shape.
    pub async fn request_array(
        &self,
        endpoint: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<JsonMap> {
        let envelope = self.request_raw(endpoint, None, method, options).await?;
        let casted = cast::<Value>(envelope, ResponseShape::GenericMap)?;
        Ok(casted.into_map().unwrap_or_default())
    }

    /// Signed request whose body is bound into `R`.
    pub async fn request_typed<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&Query>,
        method: Method,
        options: RequestOptions,
    ) -> Result<R> {
        let envelope = self.request_raw(endpoint, params, method, options).await?;
        cast_typed(envelope)
    }

    /// Signed request that presents the configured client certificate.
    pub async fn safe_request<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&Query>,
        method: Method,
        mut options: RequestOptions,
    ) -> Result<Reply<R>> {
        let cert_path = self.config.cert_path.clone().ok_or_else(|| {
            PaymentError::Configuration("cert_path is required for certificate requests".into())
        })?;
        options.client_cert = Some(ClientCert {
            cert_path,
            key_path: self.config.key_path.clone(),
        });
        self.request(endpoint, params, method, options, false).await
    }
}

fn normalize_method(method: Method) -> Method {
    if !method.as_str().bytes().any(|b| b.is_ascii_lowercase()) {
        return method;
    }
    Method::from_bytes(method.as_str().to_ascii_uppercase().as_bytes()).unwrap_or(method)
}

/// True when `endpoint` starts with a URI scheme such as `https://`.
fn is_absolute(endpoint: &str) -> bool {
    endpoint.split_once("://").is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Splits an absolute URL into origin and path-with-query.
/// Relative endpoints have no origin and are rooted at `/`.
fn split_origin(endpoint: &str) -> Result<(Option<String>, String)> {
    if !is_absolute(endpoint) {
        let path = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{endpoint}")
        };
        return Ok((None, path));
    }
    let uri: Uri = endpoint
        .parse()
        .map_err(|e| PaymentError::Configuration(format!("invalid URL {endpoint}: {e}")))?;
    let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) else {
        return Err(PaymentError::Configuration(format!(
            "URL {endpoint} has no scheme or host"
        )));
    };
    let path = uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());
    Ok((Some(format!("{scheme}://{authority}")), path))
}
