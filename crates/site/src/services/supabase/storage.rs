//! Supabase Storage: signed download links and uploads.

use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{SupabaseClient, SupabaseError};

#[derive(Deserialize)]
struct BucketEntry {
    name: String,
}

/// Settings for a bucket created by [`SupabaseClient::ensure_bucket`].
#[derive(Debug, Clone)]
pub struct BucketSpec<'a> {
    pub name: &'a str,
    pub public: bool,
    /// Largest accepted object, in bytes
    pub file_size_limit: u64,
    pub allowed_mime_types: &'a [&'a str],
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseClient {
    /// Create a time-limited download URL for a private object.
    ///
    /// # Errors
    ///
    /// Returns error if the object does not exist or the request fails.
    #[instrument(skip(self))]
    pub async fn create_signed_url(
        &self,
        bucket: &str,
        object_path: &str,
        expires_in_secs: u64,
    ) -> Result<String, SupabaseError> {
        let url = format!(
            "{}/storage/v1/object/sign/{bucket}/{}",
            self.url(),
            object_path.trim_start_matches('/')
        );
        let response = self
            .http()
            .post(url)
            .bearer_auth(self.server_token())
            .json(&json!({ "expiresIn": expires_in_secs }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| SupabaseError::Parse(format!("Failed to parse signed URL: {e}")))?;

        // The API answers with a path relative to /storage/v1
        Ok(format!("{}/storage/v1{}", self.url(), signed.signed_url))
    }

    /// Upload bytes to `bucket/object_path`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns error if the upload is rejected or the request fails.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        object_path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}/storage/v1/object/{bucket}/{object_path}", self.url());
        let response = self
            .http()
            .post(url)
            .bearer_auth(self.server_token())
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    /// Create the bucket unless one with the same name exists.
    ///
    /// Returns `true` when the bucket was created.
    ///
    /// # Errors
    ///
    /// Returns error if listing or creating buckets fails.
    #[instrument(skip(self), fields(bucket = spec.name))]
    pub async fn ensure_bucket(&self, spec: &BucketSpec<'_>) -> Result<bool, SupabaseError> {
        let url = format!("{}/storage/v1/bucket", self.url());
        let response = self
            .http()
            .get(&url)
            .bearer_auth(self.server_token())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }
        let buckets: Vec<BucketEntry> = response
            .json()
            .await
            .map_err(|e| SupabaseError::Parse(format!("Failed to parse buckets: {e}")))?;
        if buckets.iter().any(|b| b.name == spec.name) {
            return Ok(false);
        }

        let response = self
            .http()
            .post(&url)
            .bearer_auth(self.server_token())
            .json(&json!({
                "id": spec.name,
                "name": spec.name,
                "public": spec.public,
                "file_size_limit": spec.file_size_limit,
                "allowed_mime_types": spec.allowed_mime_types,
            }))
            .send()
            .await?;
        if response.status().is_success() {
            tracing::info!(bucket = spec.name, "Created storage bucket");
            Ok(true)
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    /// Public URL of an object in a public bucket.
    #[must_use]
    pub fn public_url(&self, bucket: &str, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{object_path}",
            self.url()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::BucketSpec;
    use crate::services::supabase::test_client;

    #[tokio::test]
    async fn test_create_signed_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/ebooks/pdfs/atlas.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/ebooks/pdfs/atlas.pdf?token=abc"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let url = client
            .create_signed_url("ebooks", "pdfs/atlas.pdf", 300)
            .await
            .unwrap();
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/sign/ebooks/pdfs/atlas.pdf?token=abc",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_upload_sets_upsert_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/images/migrated/1-a.png"))
            .and(header("x-upsert", "true"))
            .and(header("Content-Type", "image/png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .upload("images", "migrated/1-a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(
            client.public_url("images", "migrated/1-a.png"),
            format!("{}/storage/v1/object/public/images/migrated/1-a.png", server.uri())
        );
    }

    const PDF_BUCKET: BucketSpec<'static> = BucketSpec {
        name: "ebooks",
        public: false,
        file_size_limit: 1024,
        allowed_mime_types: &["application/pdf"],
    };

    #[tokio::test]
    async fn test_ensure_bucket_creates_missing_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/bucket"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "images", "name": "images"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/bucket"))
            .and(body_partial_json(serde_json::json!({
                "name": "ebooks", "public": false, "allowed_mime_types": ["application/pdf"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "ebooks"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(client.ensure_bucket(&PDF_BUCKET).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_bucket_keeps_existing_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/bucket"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "ebooks", "name": "ebooks"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(!client.ensure_bucket(&PDF_BUCKET).await.unwrap());
    }
}
