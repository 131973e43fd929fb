//! Hash lookup tables the converter needs to resolve names.
//!
//! Files are create-if-absent: anything already on disk is trusted and never
//! re-fetched, and only missing files are requested, all at once.

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use futures::StreamExt;
use futures::future::join_all;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Files the converter expects in the hash directory
pub const HASH_FILES: [&str; 6] = [
    "hashes.game.txt",
    "hashes.lcu.txt",
    "hashes.binfields.txt",
    "hashes.bintypes.txt",
    "hashes.binhashes.txt",
    "hashes.binentries.txt",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The game hash table is large; allow slow links
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Overall result of provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStatus {
    Ready,
    PartialFailure,
}

/// What provisioning found and did, per file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub already_present: Vec<String>,
    pub fetched: Vec<String>,
    /// (file name, reason)
    pub failed: Vec<(String, String)>,
}

impl ProvisionReport {
    pub fn status(&self) -> ProvisionStatus {
        if self.failed.is_empty() {
            ProvisionStatus::Ready
        } else {
            ProvisionStatus::PartialFailure
        }
    }

    pub fn missing(&self) -> Vec<String> {
        self.failed.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Hash files absent from `dir`
pub fn missing_hash_files(dir: &Utf8Path) -> Vec<&'static str> {
    HASH_FILES
        .iter()
        .copied()
        .filter(|name| !dir.join(name).is_file())
        .collect()
}

/// Downloads missing hash files from `<base_url>/<file>`
pub struct HashProvisioner {
    client: reqwest::Client,
    base_url: String,
}

impl HashProvisioner {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("patchfixer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file_name)
    }

    /// Make sure every hash file exists in `dir`, fetching missing ones.
    ///
    /// Only failure to create `dir` is an error; failed downloads are
    /// reported in the returned [`ProvisionReport`].
    pub async fn ensure(&self, dir: &Utf8Path) -> Result<ProvisionReport> {
        let missing = missing_hash_files(dir);

        let mut report = ProvisionReport {
            already_present: HASH_FILES
                .iter()
                .filter(|name| !missing.contains(name))
                .map(|name| name.to_string())
                .collect(),
            ..ProvisionReport::default()
        };

        if missing.is_empty() {
            tracing::info!("All required hash files are present in {}", dir);
            return Ok(report);
        }

        tracing::info!("Missing {} hash files in {}; downloading", missing.len(), dir);
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create hash directory: {}", dir))?;

        let downloads = missing.iter().map(|name| async move {
            let result = self.fetch(name, dir).await;
            (*name, result)
        });

        for (name, result) in join_all(downloads).await {
            match result {
                Ok(bytes) => {
                    tracing::info!("Downloaded {} ({} bytes)", name, bytes);
                    report.fetched.push(name.to_string());
                }
                Err(e) => {
                    tracing::warn!("Failed to download {}: {:#}", name, e);
                    report.failed.push((name.to_string(), format!("{:#}", e)));
                }
            }
        }

        Ok(report)
    }

    /// Fetch one file, writing through a `.part` file so an interrupted
    /// download never looks present
    async fn fetch(&self, file_name: &str, dir: &Utf8Path) -> Result<usize> {
        let url = self.url_for(file_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {}", url, status);
        }

        let dest = dir.join(file_name);
        let partial = dir.join(format!("{}.part", file_name));
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.context(format!("Failed to download {}", url)));
            }
        };

        tokio::fs::rename(&partial, &dest)
            .await
            .with_context(|| format!("Failed to move {} into place", dest))?;

        Ok(written)
    }
}

/// Stream a response body into `path` chunk by chunk
async fn write_body(response: reqwest::Response, path: &Utf8Path) -> Result<usize> {
    let mut file = File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path))?;

    let mut written = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read chunk")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", path))?;
        written += chunk.len();
    }

    file.flush()
        .await
        .with_context(|| format!("Failed to flush {}", path))?;
    Ok(written)
}
