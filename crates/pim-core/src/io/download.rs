//! Artifact downloads with streaming SHA-256 verification.
//!
//! Bytes are written to a [`NamedTempFile`] inside the destination directory
//! while they are hashed, so the verified file can later be renamed into
//! place on the same filesystem. A failed or mismatching download drops the
//! temp file, which deletes it.

use std::path::Path;

use futures::StreamExt;
use pim_schema::{PluginName, Sha256Checksum};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Reporter;
use crate::paths::join_url;
use crate::plugin::Plugin;

/// Errors raised while fetching a single artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered 404.
    #[error("Not found: {url}")]
    NotFound {
        /// Requested URL.
        url: String,
    },

    /// Any other non-success status.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Downloaded bytes did not hash to the published checksum.
    #[error("Invalid checksum for {plugin} plugin {version}, expected '{expected}', but got '{actual}'")]
    ChecksumMismatch {
        /// Plugin name.
        plugin: String,
        /// Plugin version.
        version: String,
        /// Published checksum.
        expected: String,
        /// Checksum of the received bytes, in the same encoding.
        actual: String,
    },
}

/// Base locations used to derive a download URL when a plugin has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicy {
    /// Base of the version-specific update center, set only when the host
    /// version is known (`…/latest/<name>.hpi` lives below it).
    pub latest_base: Option<String>,
    /// Base of the experimental update center.
    pub experimental_base: String,
    /// Root of the incrementals Maven mirror.
    pub incrementals_mirror: String,
    /// Download root (`…/plugins/<name>/<version>/<name>.hpi` lives below it).
    pub download_base: String,
}

impl UrlPolicy {
    /// Pick the source URL for `plugin`.
    ///
    /// An explicit URL always wins. Otherwise, in order: the versioned
    /// update center for floating plugins, the experimental update center,
    /// the incrementals mirror, and finally the generic download path.
    pub fn download_url(&self, plugin: &Plugin) -> String {
        if let Some(url) = &plugin.url {
            return url.clone();
        }

        let name = plugin.name().as_str();
        let hpi = format!("{name}.hpi");

        if plugin.latest
            && let Some(base) = &self.latest_base
        {
            return join_url(base, &["latest", &hpi]);
        }

        if plugin.experimental {
            return join_url(&self.experimental_base, &["latest", &hpi]);
        }

        let version = plugin.version_string();
        if let Some(group_id) = plugin.group_id() {
            let group_path = group_id.replace('.', "/");
            return join_url(
                &self.incrementals_mirror,
                &[&group_path, name, &version, &format!("{name}-{version}.hpi")],
            );
        }

        join_url(&self.download_base, &["plugins", name, &version, &hpi])
    }
}

/// A fully received artifact, still in its temp file.
#[derive(Debug)]
pub struct VerifiedDownload {
    /// Temp file holding the bytes; deleted on drop unless persisted.
    pub file: NamedTempFile,
    /// Number of bytes received.
    pub size: u64,
}

impl VerifiedDownload {
    /// Path of the temp file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Request for one artifact download.
pub struct DownloadRequest<'a, R: Reporter + ?Sized> {
    /// Shared HTTP client.
    pub client: &'a Client,
    /// Plugin being fetched (used for progress and error messages).
    pub name: &'a PluginName,
    /// Version being fetched.
    pub version: &'a str,
    /// Source URL.
    pub url: &'a str,
    /// Directory the temp file is created in.
    pub dir: &'a Path,
    /// Published checksum, if any.
    pub expected: Option<&'a Sha256Checksum>,
    /// Progress sink.
    pub reporter: &'a R,
}

impl<R: Reporter + ?Sized> DownloadRequest<'_, R> {
    /// Stream the artifact to a temp file, hashing as it goes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] on 404, [`DownloadError::Status`]
    /// on any other non-success status, and
    /// [`DownloadError::ChecksumMismatch`] when the bytes do not match
    /// `expected`. No temp file survives an error.
    pub async fn execute(self) -> Result<VerifiedDownload, DownloadError> {
        debug!(url = self.url, "Downloading");
        let response = self
            .client
            .get(self.url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(DownloadError::NotFound {
                    url: self.url.to_string(),
                });
            }
            s if !s.is_success() => {
                return Err(DownloadError::Status {
                    url: self.url.to_string(),
                    status: s.as_u16(),
                });
            }
            _ => {}
        }

        let total = response.content_length();
        self.reporter.downloading(self.name, self.version, 0, total);

        let tmp = NamedTempFile::with_prefix_in(format!(".{}-", self.name), self.dir)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            self.reporter
                .downloading(self.name, self.version, downloaded, total);
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let digest = hasher.finalize().to_vec();

        if let Some(expected) = self.expected
            && !expected.matches(&digest)
        {
            return Err(DownloadError::ChecksumMismatch {
                plugin: self.name.to_string(),
                version: self.version.to_string(),
                expected: expected.to_string(),
                actual: expected.encode(&digest),
            });
        }

        Ok(VerifiedDownload {
            file: tmp,
            size: downloaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use base64::Engine;
    use mockito::Server;
    use pim_schema::VersionSpec;
    use tempfile::TempDir;

    fn policy() -> UrlPolicy {
        UrlPolicy {
            latest_base: None,
            experimental_base: "https://uc/experimental".into(),
            incrementals_mirror: "https://repo/incrementals".into(),
            download_base: "https://uc/download".into(),
        }
    }

    #[test]
    fn test_url_precedence() {
        let p = policy();

        let explicit = Plugin::exact("git", "1.0").with_url("https://elsewhere/git.hpi");
        assert_eq!(p.download_url(&explicit), "https://elsewhere/git.hpi");

        let exact = Plugin::exact("git", "4.11.4");
        assert_eq!(
            p.download_url(&exact),
            "https://uc/download/plugins/git/4.11.4/git.hpi"
        );

        let mut floating = Plugin::exact("git", "5.0");
        floating.latest = true;
        assert_eq!(
            p.download_url(&floating),
            "https://uc/download/plugins/git/5.0/git.hpi"
        );

        let versioned = UrlPolicy {
            latest_base: Some("https://uc/dynamic-2.440".into()),
            ..policy()
        };
        assert_eq!(
            versioned.download_url(&floating),
            "https://uc/dynamic-2.440/latest/git.hpi"
        );

        let mut experimental = Plugin::exact("git", "5.0-beta-1");
        experimental.experimental = true;
        assert_eq!(
            p.download_url(&experimental),
            "https://uc/experimental/latest/git.hpi"
        );

        let incr = Plugin::new(
            "workflow-support",
            VersionSpec::parse("incrementals;org.jenkins-ci.plugins.workflow;2.20-rc530.b4f7")
                .unwrap(),
        );
        assert_eq!(
            p.download_url(&incr),
            "https://repo/incrementals/org/jenkins-ci/plugins/workflow/workflow-support/2.20-rc530.b4f7/workflow-support-2.20-rc530.b4f7.hpi"
        );
    }

    #[tokio::test]
    async fn test_download_verifies_checksum() {
        let mut server = Server::new_async().await;
        let body = b"plugin bytes";
        let expected = Sha256Checksum::new(
            base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body)),
        );
        let _m = server
            .mock("GET", "/git.hpi")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::new();
        let url = format!("{}/git.hpi", server.url());
        let name = PluginName::new("git");
        let dl = DownloadRequest {
            client: &client,
            name: &name,
            version: "1.0",
            url: &url,
            dir: dir.path(),
            expected: Some(&expected),
            reporter: &NullReporter,
        }
        .execute()
        .await
        .unwrap();

        assert_eq!(dl.size, body.len() as u64);
        assert_eq!(std::fs::read(dl.path()).unwrap(), body);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_no_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/git.hpi")
            .with_status(200)
            .with_body("tampered")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::new();
        let url = format!("{}/git.hpi", server.url());
        let name = PluginName::new("git");
        let expected = Sha256Checksum::new("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        let err = DownloadRequest {
            client: &client,
            name: &name,
            version: "1.0",
            url: &url,
            dir: dir.path(),
            expected: Some(&expected),
            reporter: &NullReporter,
        }
        .execute()
        .await
        .unwrap_err();

        let actual = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(b"tampered"));
        match err {
            DownloadError::ChecksumMismatch {
                plugin,
                version,
                expected: e,
                actual: a,
            } => {
                assert_eq!(plugin, "git");
                assert_eq!(version, "1.0");
                assert_eq!(e, expected.as_str());
                assert_eq!(a, actual);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_distinguished() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.hpi")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::new();
        let url = format!("{}/missing.hpi", server.url());
        let name = PluginName::new("missing");
        let err = DownloadRequest {
            client: &client,
            name: &name,
            version: "1.0",
            url: &url,
            dir: dir.path(),
            expected: None,
            reporter: &NullReporter,
        }
        .execute()
        .await
        .unwrap_err();

        assert!(matches!(err, DownloadError::NotFound { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
