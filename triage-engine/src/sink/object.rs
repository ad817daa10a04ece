//! S3-compatible object storage sink
//!
//! Uploads reports with a single path-style `PUT` signed with AWS Signature
//! Version 4, which MinIO and S3 both accept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::info;
use triage_core::domain::task::ReportMetadata;

use super::{Sink, SinkKind, report_stem};
use crate::error::SinkError;
use crate::params::Params;

type HmacSha256 = Hmac<Sha256>;

const CONTENT_TYPE: &str = "text/markdown";
const SERVICE: &str = "s3";

/// Connection settings for the object store
#[derive(Debug, Clone)]
pub struct ObjectSinkConfig {
    /// `host[:port]`, optionally with a scheme
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub secure: bool,
}

/// Sink uploading reports as `{prefix}{timestamp}_{label}.md`
pub struct ObjectSink {
    config: ObjectSinkConfig,
    client: reqwest::Client,
}

impl ObjectSink {
    pub fn new(config: ObjectSinkConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: ObjectSinkConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Reads `endpoint`, `access_key`, `secret_key` and `bucket_name`
    ///
    /// `object_prefix` defaults to `reports/`, `region` to `us-east-1` and
    /// `secure` to false.
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        Ok(Self::new(ObjectSinkConfig {
            endpoint: p.require("endpoint")?,
            access_key: p.require("access_key")?,
            secret_key: p.require("secret_key")?,
            bucket: p.require("bucket_name")?,
            prefix: p.string_or("object_prefix", "reports/"),
            region: p.string_or("region", "us-east-1"),
            secure: p.bool_or("secure", false),
        }))
    }

    pub fn object_name(&self, metadata: &ReportMetadata) -> String {
        format!("{}{}.md", self.config.prefix, report_stem(metadata))
    }

    /// Host (with port) and scheme derived from the endpoint setting
    fn host_and_scheme(&self) -> (String, &'static str) {
        let endpoint = self.config.endpoint.trim_end_matches('/');
        if let Some(host) = endpoint.strip_prefix("https://") {
            (host.to_string(), "https")
        } else if let Some(host) = endpoint.strip_prefix("http://") {
            (host.to_string(), "http")
        } else if self.config.secure {
            (endpoint.to_string(), "https")
        } else {
            (endpoint.to_string(), "http")
        }
    }

    /// Builds the `Authorization` header value for a `PUT`
    fn authorization(
        &self,
        host: &str,
        canonical_uri: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> String {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let headers = [
            ("content-type", CONTENT_TYPE),
            ("host", host),
            ("x-amz-content-sha256", payload_hash),
            ("x-amz-date", amz_date.as_str()),
        ];
        let signed_headers = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.config.region, SERVICE
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.config.secret_key, &date_stamp, &self.config.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key, credential_scope, signed_headers, signature
        )
    }
}

#[async_trait]
impl Sink for ObjectSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Object
    }

    async fn save(
        &self,
        report: &str,
        metadata: &ReportMetadata,
    ) -> Result<Option<String>, SinkError> {
        let object = self.object_name(metadata);
        let (host, scheme) = self.host_and_scheme();
        let encoded_key = object.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key);
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let now = Utc::now();
        let payload_hash = hex_sha256(report.as_bytes());
        let authorization = self.authorization(&host, &canonical_uri, &payload_hash, now);

        let response = self
            .client
            .put(&url)
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", now.format("%Y%m%dT%H%M%SZ").to_string())
            .body(report.to_string())
            .send()
            .await
            .map_err(|e| SinkError::Storage(format!("PUT {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Storage(format!(
                "PutObject failed (HTTP {}) for '{}': {}",
                status, object, body
            )));
        }

        let location = format!("{}/{}", self.config.bucket, object);
        info!("Report uploaded to {}", location);
        Ok(Some(location))
    }
}

// ============ SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), "s3"), "aws4_request")
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding, leaving only unreserved characters
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_metadata;
    use chrono::TimeZone;
    use wiremock::matchers::{body_string, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> ObjectSinkConfig {
        ObjectSinkConfig {
            endpoint: endpoint.to_string(),
            access_key: "AKIDEXAMPLE".into(),
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            bucket: "triage".into(),
            prefix: "reports/".into(),
            region: "us-east-1".into(),
            secure: false,
        }
    }

    #[test]
    fn test_signing_key_matches_reference() {
        // Published AWS SigV4 example key derivation for iam in us-east-1
        let secret = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
        let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), b"20150830");
        let k_region = hmac_sha256(&k_date, b"us-east-1");
        let k_service = hmac_sha256(&k_region, b"iam");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        assert_eq!(
            hex::encode(k_signing),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
    }

    #[test]
    fn test_authorization_is_deterministic() {
        let sink = ObjectSink::new(config("minio:9000"));
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let a = sink.authorization("minio:9000", "/triage/reports/x.md", "abc", now);
        let b = sink.authorization("minio:9000", "/triage/reports/x.md", "abc", now);
        assert_eq!(a, b);
        assert!(a.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/us-east-1/s3/aws4_request, \
             SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date, Signature="
        ));
    }

    #[test]
    fn test_host_and_scheme() {
        let mut cfg = config("minio:9000");
        assert_eq!(
            ObjectSink::new(cfg.clone()).host_and_scheme(),
            ("minio:9000".to_string(), "http")
        );
        cfg.secure = true;
        assert_eq!(
            ObjectSink::new(cfg.clone()).host_and_scheme(),
            ("minio:9000".to_string(), "https")
        );
        cfg.endpoint = "http://localhost:9000/".into();
        assert_eq!(
            ObjectSink::new(cfg).host_and_scheme(),
            ("localhost:9000".to_string(), "http")
        );
    }

    #[test]
    fn test_from_params_requires_credentials() {
        let params = serde_json::json!({ "endpoint": "minio:9000", "bucket_name": "b" });
        assert!(ObjectSink::from_params(params.as_object().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_put_signed_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/triage/reports/20240102_030405_web.md"))
            .and(header("content-type", "text/markdown"))
            .and(header_exists("x-amz-date"))
            .and(header_exists("authorization"))
            .and(body_string("# report"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ObjectSink::new(config(&server.uri()));
        let location = sink.save("# report", &test_metadata("web")).await.unwrap();

        assert_eq!(
            location.as_deref(),
            Some("triage/reports/20240102_030405_web.md")
        );
    }

    #[tokio::test]
    async fn test_rejected_upload_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
            .mount(&server)
            .await;

        let sink = ObjectSink::new(config(&server.uri()));
        let err = sink.save("# report", &test_metadata("web")).await.unwrap_err();

        match err {
            SinkError::Storage(msg) => assert!(msg.contains("AccessDenied")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
