use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical source identifiers, declared in aggregation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Marketplace,
    Classifieds,
    Generative,
    Synthetic,
}

impl SourceId {
    pub const ALL: [Self; 4] = [
        Self::Marketplace,
        Self::Classifieds,
        Self::Generative,
        Self::Synthetic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marketplace => "marketplace",
            Self::Classifieds => "classifieds",
            Self::Generative => "generative",
            Self::Synthetic => "synthetic",
        }
    }

    /// Prefix placed in front of every listing id produced by this source.
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Marketplace => "ml",
            Self::Classifieds => "yapo",
            Self::Generative => "ai",
            Self::Synthetic => "fb",
        }
    }

    /// Recovers the source of a listing from its id prefix.
    pub fn from_listing_id(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once('-')?;
        Self::ALL
            .into_iter()
            .find(|source| source.id_prefix() == prefix)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "marketplace" => Ok(Self::Marketplace),
            "classifieds" => Ok(Self::Classifieds),
            "generative" => Ok(Self::Generative),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_ids_map_back_to_their_source() {
        assert_eq!(SourceId::from_listing_id("ml-MLC123"), Some(SourceId::Marketplace));
        assert_eq!(SourceId::from_listing_id("ai-3"), Some(SourceId::Generative));
        assert_eq!(SourceId::from_listing_id("fb-0"), Some(SourceId::Synthetic));
        assert_eq!(SourceId::from_listing_id("google-shopping"), None);
        assert_eq!(SourceId::from_listing_id("plain"), None);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("  Generative ".parse::<SourceId>(), Ok(SourceId::Generative));
        assert!("yahoo".parse::<SourceId>().is_err());
    }
}
