use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use cartwatch_core_types::WatchError;

use crate::errors::SessionError;

/// Parameters accepted by `Network.setCookies`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// Opaque cookie-blob codec. An external collaborator; the engine never
/// looks inside the blob beyond attempting to parse the decrypted form.
pub trait CookieCodec: Send + Sync {
    fn encrypt(&self, json: &str) -> Result<String, WatchError>;
    fn decrypt(&self, blob: &str) -> Result<String, WatchError>;
}

/// Codec for deployments that store cookie sets in the clear.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughCodec;

impl CookieCodec for PassthroughCodec {
    fn encrypt(&self, json: &str) -> Result<String, WatchError> {
        Ok(json.to_string())
    }

    fn decrypt(&self, blob: &str) -> Result<String, WatchError> {
        Ok(blob.to_string())
    }
}

/// Parse a stored cookie blob: a directly-parseable JSON array first, the
/// decrypted form second.
pub fn parse_cookie_blob(
    blob: &str,
    codec: &dyn CookieCodec,
) -> Result<Vec<CookieParam>, SessionError> {
    if let Ok(cookies) = serde_json::from_str::<Vec<CookieParam>>(blob) {
        return Ok(cookies);
    }

    let decrypted = codec
        .decrypt(blob)
        .map_err(|err| SessionError::CookieBlob(format!("decrypt failed: {err}")))?;
    serde_json::from_str(&decrypted)
        .map_err(|err| SessionError::CookieBlob(format!("decrypted blob is not a cookie array: {err}")))
}

/// Cheap signature of a cookie blob; a changed fingerprint forces session
/// recreation, full comparison is never done.
pub fn fingerprint(blob: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    blob.unwrap_or_default().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReversingCodec;

    impl CookieCodec for ReversingCodec {
        fn encrypt(&self, json: &str) -> Result<String, WatchError> {
            Ok(json.chars().rev().collect())
        }

        fn decrypt(&self, blob: &str) -> Result<String, WatchError> {
            Ok(blob.chars().rev().collect())
        }
    }

    #[test]
    fn plain_json_array_parses_directly() {
        let blob = r#"[{"name":"sid","value":"abc","domain":".example.com"}]"#;
        let cookies = parse_cookie_blob(blob, &PassthroughCodec).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
    }

    #[test]
    fn encrypted_blob_goes_through_the_codec() {
        let json = r#"[{"name":"sid","value":"abc"}]"#;
        let blob = ReversingCodec.encrypt(json).unwrap();
        let cookies = parse_cookie_blob(&blob, &ReversingCodec).unwrap();
        assert_eq!(cookies[0].value, "abc");
    }

    #[test]
    fn garbage_blob_is_a_cookie_error() {
        let err = parse_cookie_blob("not json at all", &PassthroughCodec).unwrap_err();
        assert!(matches!(err, SessionError::CookieBlob(_)));
    }

    #[test]
    fn fingerprint_distinguishes_blobs() {
        assert_eq!(fingerprint(None), fingerprint(None));
        assert_ne!(fingerprint(Some("a")), fingerprint(Some("b")));
        assert_eq!(fingerprint(Some("a")), fingerprint(Some("a")));
    }
}
