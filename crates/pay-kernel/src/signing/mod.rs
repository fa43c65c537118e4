mod signer;
mod rsa;
mod authorization;

pub use signer::RequestSigner;
pub use self::rsa::RsaSigner;
pub use authorization::{AUTH_SCHEME, Authorizer, RequestSignChain, string_to_sign};
