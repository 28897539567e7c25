use serde::{Deserialize, Serialize};
use stash_types::{Fragment, Key, TypeError};

/// Attributes one discovered resource contributes to the index.
///
/// Resources sharing a file stem (`AV.ini`, `AV.zip`) share a [`Key`]; the
/// lowercased extension becomes the sub-key under it. Optional attributes
/// are stored verbatim as the producer reported them and omitted when unset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub key: Key,
    pub kind: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// How long the resource took to fetch, as reported (e.g. `"1 seconds"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// When the crawler visited the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited: Option<String>,
}

impl ResourceRecord {
    /// Build a record from a resource URL.
    ///
    /// The last path segment is the resource name. Its stem, lowercased, is
    /// the key and its extension, lowercased, is the kind. Query strings and
    /// URL fragments are ignored.
    pub fn from_url(url: &str) -> Result<Self, TypeError> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let name = path.rsplit('/').next().unwrap_or(path);

        let invalid = |reason: &str| TypeError::InvalidFileName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("URL has no resource name"));
        }
        let (stem, extension) = name
            .rsplit_once('.')
            .filter(|(stem, extension)| !stem.is_empty() && !extension.is_empty())
            .ok_or_else(|| invalid("resource name has no extension"))?;

        Ok(Self {
            key: Key::new(stem.to_lowercase()),
            kind: extension.to_lowercase(),
            name: name.to_string(),
            url: url.to_string(),
            size: None,
            md5: None,
            sha256: None,
            status: None,
            content_type: None,
            modified: None,
            created: None,
            depth: None,
            referer: None,
            response: None,
            visited: None,
        })
    }

    /// Convert into the fragment `{ key: { kind: attributes } }`.
    pub fn into_fragment(self) -> Result<Fragment, TypeError> {
        let attributes = serde_json::to_value(&self)
            .map_err(|e| TypeError::InvalidFragment(e.to_string()))?;
        Ok(Fragment::single(self.key, self.kind, attributes))
    }
}

impl TryFrom<ResourceRecord> for Fragment {
    type Error = TypeError;

    fn try_from(record: ResourceRecord) -> Result<Self, Self::Error> {
        record.into_fragment()
    }
}
