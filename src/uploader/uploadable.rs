use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::ParseError;

/// Opaque reference to shared content: an absolute URI (`file:///...`,
/// `content://...`) or a plain filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Single-letter schemes are Windows drive letters, not URIs
    fn as_url(&self) -> Option<Url> {
        match Url::parse(&self.0) {
            Ok(url) if url.scheme().len() > 1 => Some(url),
            _ => None,
        }
    }

    /// Last non-empty path segment, percent-decoded for URIs.
    pub fn display_name(&self) -> Option<String> {
        let name = match self.as_url() {
            Some(url) => {
                let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
                percent_decode_str(segment).decode_utf8_lossy().into_owned()
            }
            None => Path::new(&self.0)
                .file_name()?
                .to_string_lossy()
                .into_owned(),
        };

        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Local path for `file:` URIs and bare paths. Other schemes have none.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        match self.as_url() {
            Some(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Some(_) => None,
            None => Some(PathBuf::from(&self.0)),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceRef {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    content: String,
    ordinal: usize,
}

impl TextItem {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    locator: ResourceRef,
    name: String,
}

impl FileRef {
    pub fn locator(&self) -> &ResourceRef {
        &self.locator
    }
}

/// One unit of content destined for exactly one upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uploadable {
    Text(TextItem),
    File(FileRef),
}

impl Uploadable {
    pub fn text(content: impl Into<String>, ordinal: usize) -> Self {
        Uploadable::Text(TextItem {
            content: content.into(),
            ordinal,
        })
    }

    /// Fails with `InvalidReference` when the locator has no usable name.
    pub fn file(locator: ResourceRef) -> Result<Self, ParseError> {
        let name = locator
            .display_name()
            .ok_or_else(|| ParseError::invalid_reference(locator.as_str()))?;

        Ok(Uploadable::File(FileRef { locator, name }))
    }

    /// Names are not deduplicated across batches.
    pub fn name(&self) -> String {
        match self {
            Uploadable::Text(item) => format!("{}.txt", item.ordinal),
            Uploadable::File(file) => file.name.clone(),
        }
    }
}
