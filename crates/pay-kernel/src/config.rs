use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PaymentError, Result};
use crate::response::ResponseShape;

pub const DEFAULT_BASE_URI: &str = "https://api.mch.weixin.qq.com/";

/// Merchant identity, credential locations and behavioural flags.
///
/// Built once per client and shared read-only by every request it issues.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app_id: String,
    pub mch_id: String,
    /// Serial number of the merchant API certificate.
    pub serial_no: String,
    /// PEM encoded RSA private key (PKCS#8 or PKCS#1).
    pub key_path: PathBuf,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub response_type: ResponseShape,
    #[serde(default)]
    pub sandbox: bool,
    /// Scheme and host requests go to. Any path here is ignored: the
    /// signed canonical URL is the whole path on the wire.
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
}

fn default_base_uri() -> String {
    DEFAULT_BASE_URI.to_string()
}

impl Config {
    pub fn new(
        app_id: impl Into<String>,
        mch_id: impl Into<String>,
        serial_no: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            mch_id: mch_id.into(),
            serial_no: serial_no.into(),
            key_path: key_path.into(),
            cert_path: None,
            response_type: ResponseShape::default(),
            sandbox: false,
            base_uri: default_base_uri(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PaymentError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            PaymentError::Configuration(format!("parsing {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the signer could never work with.
    pub fn validate(&self) -> Result<()> {
        if self.mch_id.trim().is_empty() {
            return Err(PaymentError::Configuration("mch_id is empty".into()));
        }
        if self.serial_no.trim().is_empty() {
            return Err(PaymentError::Configuration("serial_no is empty".into()));
        }
        if self.key_path.as_os_str().is_empty() {
            return Err(PaymentError::Configuration("key_path is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_optional_fields() {
        let config: Config = serde_json::from_str(
            r#"{"app_id":"wx1","mch_id":"1900","serial_no":"ABC","key_path":"/keys/apiclient_key.pem"}"#,
        )
        .unwrap();
        assert_eq!(config.response_type, ResponseShape::GenericMap);
        assert!(!config.sandbox);
        assert!(config.cert_path.is_none());
        assert_eq!(config.base_uri, DEFAULT_BASE_URI);
        config.validate().unwrap();
    }

    #[test]
    fn response_type_accepts_provider_names() {
        let config: Config = serde_json::from_str(
            r#"{"app_id":"wx1","mch_id":"1900","serial_no":"ABC","key_path":"k.pem","response_type":"raw","sandbox":true}"#,
        )
        .unwrap();
        assert_eq!(config.response_type, ResponseShape::RawBytes);
        assert!(config.sandbox);
    }

    #[test]
    fn empty_mch_id_is_rejected() {
        let config = Config::new("wx1", " ", "ABC", "k.pem");
        assert!(matches!(
            config.validate(),
            Err(PaymentError::Configuration(_))
        ));
    }

    #[test]
    fn empty_key_path_is_rejected() {
        let config = Config::new("wx1", "1900", "ABC", "");
        assert!(matches!(
            config.validate(),
            Err(PaymentError::Configuration(_))
        ));
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"app_id":"wx1","mch_id":"1900","serial_no":"ABC","key_path":"k.pem","cert_path":"c.pem"}}"#
        )
        .unwrap();
        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.mch_id, "1900");
        assert_eq!(config.cert_path, Some(PathBuf::from("c.pem")));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let result = Config::from_json_file("/definitely/not/here.json");
        assert!(matches!(result, Err(PaymentError::Configuration(_))));
    }
}
