use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a camera's frames come from.
///
/// Serialized as a plain string: a non-negative integer is a local device
/// index, anything else a stream address (RTSP, HTTP, file path).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceLocator {
    Device(u32),
    Stream(String),
}

impl SourceLocator {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u32>() {
            Ok(index) => SourceLocator::Device(index),
            Err(_) => SourceLocator::Stream(trimmed.to_string()),
        }
    }
}

impl From<String> for SourceLocator {
    fn from(raw: String) -> Self {
        SourceLocator::parse(&raw)
    }
}

impl From<SourceLocator> for String {
    fn from(locator: SourceLocator) -> Self {
        locator.to_string()
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Device(index) => write!(f, "{index}"),
            SourceLocator::Stream(address) => write!(f, "{address}"),
        }
    }
}
