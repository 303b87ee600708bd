use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const SHA256_HEX_LEN: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("invalid sha256sum '{0}': expected {SHA256_HEX_LEN} hex characters")]
    InvalidSha256Sum(String),
}

/// Hex encoded SHA-256 digest of a payload, normalized to lowercase.
///
/// It names the staged payload inside the download directory, so only the 64 hex characters
/// of a digest are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Sum(String);

impl Sha256Sum {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sha256Sum {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() != SHA256_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DescriptorError::InvalidSha256Sum(value));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<&str> for Sha256Sum {
    type Error = DescriptorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl From<Sha256Sum> for String {
    fn from(value: Sha256Sum) -> Self {
        value.0
    }
}

impl fmt::Display for Sha256Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declarative description of one candidate update.
///
/// Everything besides the mode, the checksum and the file name is mode specific and kept
/// untouched in `params` until an install mode maps it into its own configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateDescriptor {
    mode: String,
    sha256sum: Sha256Sum,
    #[serde(default)]
    filename: String,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl UpdateDescriptor {
    pub fn new<M: Into<String>>(mode: M, sha256sum: Sha256Sum) -> Self {
        Self {
            mode: mode.into(),
            sha256sum,
            filename: String::new(),
            params: Map::new(),
        }
    }

    pub fn with_filename<S: Into<String>>(self, filename: S) -> Self {
        Self {
            filename: filename.into(),
            ..self
        }
    }

    pub fn with_param<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn sha256sum(&self) -> &Sha256Sum {
        &self.sha256sum
    }

    /// Where the payload is staged: `download_dir/<sha256sum>`.
    pub fn payload_path(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(self.sha256sum.as_str())
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}
