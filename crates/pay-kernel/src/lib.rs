pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod options;
pub mod response;
pub mod signing;
pub mod transport;

pub use client::{BaseClient, Query, SANDBOX_PREFIX};
pub use config::Config;
pub use download::{DownloadDescriptor, DownloadPhase, HashAlgorithm};
pub use error::{PaymentError, Result};
pub use options::{JsonMap, RequestOptions};
pub use response::{Casted, Reply, ResponseShape};
pub use signing::{Authorizer, RequestSigner, RsaSigner};
pub use transport::{ClientCert, PreparedRequest, ResponseEnvelope, Transport};

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use http::Method;
