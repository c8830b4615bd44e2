//! `TaskKind`: a discriminator from a closed set that stays open for
//! extension.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    OrganizePaper,
    PaperMetadataExtraction,
    PaperElementCrawler,
    /// Any handler-defined kind not in the known set above.
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OrganizePaper => "organize_paper",
            Self::PaperMetadataExtraction => "paper_metadata_extraction",
            Self::PaperElementCrawler => "paper_element_crawler",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        match s {
            "organize_paper" => Self::OrganizePaper,
            "paper_metadata_extraction" => Self::PaperMetadataExtraction,
            "paper_element_crawler" => Self::PaperElementCrawler,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TaskKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TaskKind::from(s.as_str()))
    }
}
