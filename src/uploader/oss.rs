//! Reqwest-backed uploader speaking the OSS REST dialect.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha1::Sha1;
use std::time::Duration;

use super::Uploader;
use crate::config::OssConfig;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha1 = Hmac<Sha1>;

/// Uploads batches with header-signed PUTs (`Authorization: OSS ak:signature`,
/// HMAC-SHA1 over the canonical request string). Works against Aliyun OSS and
/// S3-compatible stores that accept the OSS signature scheme; `path_style`
/// switches the addressing for stores without wildcard DNS.
pub struct OssUploader {
    client: Client,
    config: OssConfig,
    scheme: String,
    host: String,
}

impl OssUploader {
    pub fn new(config: OssConfig) -> Result<Self> {
        config.validate()?;
        let (scheme, host) = split_endpoint(&config.endpoint)?;
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            scheme,
            host,
        })
    }

    fn object_url(&self, object_key: &str) -> String {
        if self.config.path_style {
            format!(
                "{}://{}/{}/{}",
                self.scheme, self.host, self.config.bucket, object_key
            )
        } else {
            format!(
                "{}://{}.{}/{}",
                self.scheme, self.config.bucket, self.host, object_key
            )
        }
    }

    /// Canonical string per the OSS REST API: verb, (empty) content MD5,
    /// content type, date, canonicalized resource. No `x-oss-*` headers are
    /// sent, so the header section is empty.
    fn authorization(&self, date: &str, content_type: &str, object_key: &str) -> Result<String> {
        let string_to_sign = format!(
            "PUT\n\n{}\n{}\n/{}/{}",
            content_type, date, self.config.bucket, object_key
        );
        let mut mac = HmacSha1::new_from_slice(self.config.access_key_secret.as_bytes())
            .context("invalid access key secret")?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(format!("OSS {}:{}", self.config.access_key_id, signature))
    }
}

fn split_endpoint(endpoint: &str) -> Result<(String, String)> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, host)) if !scheme.is_empty() && !host.is_empty() => {
            Ok((scheme.to_string(), host.to_string()))
        }
        _ => bail!(
            "endpoint must include a scheme, e.g. https://oss-cn-hangzhou.aliyuncs.com (got {:?})",
            endpoint
        ),
    }
}

#[async_trait::async_trait]
impl Uploader for OssUploader {
    async fn upload(
        &self,
        object_key: &str,
        body: Bytes,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> Result<()> {
        let url = self.object_url(object_key);
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.authorization(&date, content_type, object_key)?;

        let mut request = self
            .client
            .put(&url)
            .header("Date", date)
            .header("Content-Type", content_type)
            .header("Authorization", authorization)
            .body(body);
        if let Some(encoding) = content_encoding {
            request = request.header("Content-Encoding", encoding);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("PUT {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(failed to read body)".to_string());
            bail!("object storage returned {} for {}: {}", status, url, body);
        }
        Ok(())
    }
}
