//! # AUR Lookup
//!
//! Reads what is currently published on the AUR for the maintainer, through
//! the RPC v5 search endpoint:
//!
//! ```text
//! GET <rpc>/v5/search/<maintainer>?by=maintainer
//! ```
//!
//! The result is indexed by package base in [`PublishedVersions`]. The
//! pipeline uses it to find recipes that are ahead of the AUR, for instance
//! after a registry push failed in an earlier run.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::vercmp::vercmp;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One package as the AUR reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AurPackage {
    pub pkgbase: String,
    pub name: String,
    /// Full version, `[epoch:]pkgver-pkgrel`.
    pub version: String,
    pub maintainer: Option<String>,
    pub last_modified: Option<i64>,
}

/// Trait for AUR queries - allows mocking in tests
pub trait AurClient: Send + Sync {
    /// Packages currently maintained by `maintainer`.
    fn maintained_packages(&self, maintainer: &str) -> Result<Vec<AurPackage>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<RpcPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RpcPackage {
    package_base: Option<String>,
    name: Option<String>,
    version: Option<String>,
    maintainer: Option<String>,
    last_modified: Option<i64>,
}

/// Parse the body of an RPC search response.
///
/// An `error` response is an error; entries missing their base, name or
/// version are skipped.
pub fn parse_search_response(maintainer: &str, body: &str) -> Result<Vec<AurPackage>> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| Error::AurLookup {
        maintainer: maintainer.to_string(),
        message: format!("invalid RPC response: {}", e),
    })?;

    if response.kind == "error" {
        return Err(Error::AurLookup {
            maintainer: maintainer.to_string(),
            message: response.error.unwrap_or_else(|| "unknown RPC error".to_string()),
        });
    }

    let mut packages = Vec::with_capacity(response.results.len());
    for entry in response.results {
        match (entry.package_base, entry.name, entry.version) {
            (Some(pkgbase), Some(name), Some(version)) => packages.push(AurPackage {
                pkgbase,
                name,
                version,
                maintainer: entry.maintainer,
                last_modified: entry.last_modified,
            }),
            (base, name, _) => warn!(
                "Skipping incomplete AUR entry (base: {:?}, name: {:?})",
                base, name
            ),
        }
    }
    Ok(packages)
}

/// AUR RPC client over HTTPS.
pub struct AurRpcClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl AurRpcClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::AurLookup {
                maintainer: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl AurClient for AurRpcClient {
    fn maintained_packages(&self, maintainer: &str) -> Result<Vec<AurPackage>> {
        let url = format!("{}/v5/search/{}", self.base_url, maintainer);
        debug!("GET {}?by=maintainer", url);

        let lookup_error = |message: String| Error::AurLookup {
            maintainer: maintainer.to_string(),
            message,
        };
        let body = self
            .client
            .get(&url)
            .query(&[("by", "maintainer")])
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| lookup_error(e.to_string()))?;

        parse_search_response(maintainer, &body)
    }
}

/// Published versions by package base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedVersions {
    versions: BTreeMap<String, String>,
}

impl PublishedVersions {
    /// Look up everything `maintainer` has on the AUR.
    pub fn fetch(client: &dyn AurClient, maintainer: &str) -> Result<Self> {
        info!("Looking up AUR packages maintained by {}", maintainer);
        let packages = client.maintained_packages(maintainer)?;
        info!("Found {} AUR package(s) for {}", packages.len(), maintainer);
        Ok(packages.into_iter().collect())
    }

    /// Published version of `pkgbase`, if it is on the AUR.
    pub fn version_of(&self, pkgbase: &str) -> Option<&str> {
        self.versions.get(pkgbase).map(String::as_str)
    }

    /// Whether the AUR has an older version of `pkgbase` than `full_version`.
    ///
    /// Packages that are not on the AUR never lag.
    pub fn lags_behind(&self, pkgbase: &str, full_version: &str) -> bool {
        self.version_of(pkgbase)
            .is_some_and(|published| vercmp(published, full_version) == Ordering::Less)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl FromIterator<AurPackage> for PublishedVersions {
    /// Split packages share a base and a version; the first entry wins.
    fn from_iter<I: IntoIterator<Item = AurPackage>>(iter: I) -> Self {
        let mut versions = BTreeMap::new();
        for package in iter {
            versions.entry(package.pkgbase).or_insert(package.version);
        }
        Self { versions }
    }
}
