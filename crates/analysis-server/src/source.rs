//
// source.rs
//
// Identity of an analyzed source
//

use std::fmt;
use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use url::Url;

/// URI scheme used for sources that belong to the platform SDK.
pub const SDK_SCHEME: &str = "sdk";

/// A source known to an analysis context, identified by its URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(Url);

impl Source {
    pub fn new(uri: Url) -> Self {
        Self(uri)
    }

    /// Parses a source URI such as `file:///work/a.src` or `sdk:core/core.src`.
    pub fn parse(uri: &str) -> anyhow::Result<Self> {
        let uri = Url::parse(uri).map_err(|e| anyhow!("Invalid source URI '{}': {}", uri, e))?;
        Ok(Self(uri))
    }

    /// Builds a `file:` source from an absolute path.
    pub fn from_file_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let uri = Url::from_file_path(path)
            .map_err(|_| anyhow!("Invalid file path: {}", path.display()))?;
        Ok(Self(uri))
    }

    /// Builds a source for an SDK library, e.g. `Source::sdk("core/core.src")`.
    pub fn sdk(library: &str) -> anyhow::Result<Self> {
        Self::parse(&format!("{}:{}", SDK_SCHEME, library))
    }

    pub fn uri(&self) -> &Url {
        &self.0
    }

    /// Whether this source is part of the platform SDK library set.
    pub fn is_in_sdk(&self) -> bool {
        self.0.scheme() == SDK_SCHEME
    }

    /// Last path segment, used in log lines.
    pub fn short_name(&self) -> &str {
        self.0
            .path()
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or_else(|| self.0.as_str())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Url> for Source {
    fn from(uri: Url) -> Self {
        Self(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_classification() {
        let core = Source::sdk("core/core.src").unwrap();
        let user = Source::parse("file:///work/a.src").unwrap();
        assert!(core.is_in_sdk());
        assert!(!user.is_in_sdk());
    }

    #[test]
    fn test_short_name() {
        let user = Source::parse("file:///work/lib/a.src").unwrap();
        assert_eq!(user.short_name(), "a.src");
        let core = Source::sdk("core").unwrap();
        assert_eq!(core.short_name(), "core");
    }

    #[test]
    fn test_invalid_uri_rejected() {
        assert!(Source::parse("not a uri").is_err());
    }

    #[test]
    fn test_serde_is_plain_uri_string() {
        let source = Source::parse("file:///work/a.src").unwrap();
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, "\"file:///work/a.src\"");
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }
}
