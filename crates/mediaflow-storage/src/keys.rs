//! Deterministic object keys for derived artifacts.

use std::fmt;

use mediaflow_models::{JobBase, ProxyResolution, ThumbnailSize};

/// Identifies one asset within an account and project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub account_id: String,
    pub project_id: String,
    pub asset_id: String,
}

impl AssetKey {
    pub fn new(
        account_id: impl Into<String>,
        project_id: impl Into<String>,
        asset_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            project_id: project_id.into(),
            asset_id: asset_id.into(),
        }
    }

    /// Key for a derived artifact:
    /// `{account}/{project}/{asset}/derived/{discriminator}`.
    pub fn derived_key(&self, artifact: &Artifact) -> String {
        format!(
            "{}/{}/{}/derived/{}",
            self.account_id, self.project_id, self.asset_id, artifact
        )
    }
}

impl From<&JobBase> for AssetKey {
    fn from(base: &JobBase) -> Self {
        Self::new(&base.account_id, &base.project_id, &base.asset_id)
    }
}

/// Artifact discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Thumbnail(ThumbnailSize),
    Filmstrip,
    FilmstripManifest,
    Proxy(ProxyResolution),
    Waveform,
    CustomThumbnail(ThumbnailSize),
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thumbnail(size) => write!(f, "thumbnail/{}", size.as_str()),
            Self::Filmstrip => f.write_str("filmstrip"),
            Self::FilmstripManifest => f.write_str("filmstrip-manifest"),
            Self::Proxy(res) => write!(f, "proxy/{}", res.as_str()),
            Self::Waveform => f.write_str("waveform"),
            Self::CustomThumbnail(size) => write!(f, "custom-thumbnail/{}", size.as_str()),
        }
    }
}
