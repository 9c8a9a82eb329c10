use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const LOCAL_ORIGIN: &str = "http://localhost/";

/// Path component of a location inside the application.
///
/// Hosts report either absolute URLs or bare paths; only the path is kept, so
/// query strings and fragments never split one page into several entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PagePath(String);

impl PagePath {
    /// Normalise a host-reported location (absolute URL, absolute path or relative path).
    #[must_use]
    pub fn from_location(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parsed = Url::parse(trimmed)
            .or_else(|_| Url::parse(LOCAL_ORIGIN).and_then(|base| base.join(trimmed)));
        match parsed {
            Ok(url) if url.cannot_be_a_base() => Self(trimmed.to_owned()),
            Ok(url) => Self(url.path().to_owned()),
            Err(_) => Self(trimmed.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
