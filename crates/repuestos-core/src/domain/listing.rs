use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

/// Store family a listing was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Store {
    Marketplace,
    ClassifiedsSite,
    SpecialtyRetailer,
    Other,
}

const CLASSIFIEDS_FRAGMENTS: [&str; 3] = ["yapo", "chileautos", "facebook"];
const RETAILER_FRAGMENTS: [&str; 5] = [
    "autopartners",
    "auto partners",
    "autoplanet",
    "mundo repuestos",
    "repuestos",
];

impl Store {
    /// Maps a free-text store name onto a store family.
    ///
    /// Matching is case-insensitive on known name fragments; anything
    /// unrecognized becomes [`Store::Other`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return Self::Other;
        }
        if label.contains("mercado") {
            return Self::Marketplace;
        }
        if CLASSIFIEDS_FRAGMENTS
            .iter()
            .any(|fragment| label.contains(fragment))
        {
            return Self::ClassifiedsSite;
        }
        if RETAILER_FRAGMENTS
            .iter()
            .any(|fragment| label.contains(fragment))
        {
            return Self::SpecialtyRetailer;
        }
        Self::Other
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marketplace => "Marketplace",
            Self::ClassifiedsSite => "ClassifiedsSite",
            Self::SpecialtyRetailer => "SpecialtyRetailer",
            Self::Other => "Other",
        }
    }

    /// Human-facing store name used in generated descriptions.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Marketplace => "MercadoLibre",
            Self::ClassifiedsSite => "Yapo",
            Self::SpecialtyRetailer => "AutoPartners",
            Self::Other => "Other store",
        }
    }
}

impl Display for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Part category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Engine,
    Brakes,
    Suspension,
    Electrical,
    Body,
    Transmission,
    Interior,
    Other,
}

impl Category {
    /// Parses English or Spanish labels, ignoring case and accents.
    pub fn from_label(label: &str) -> Option<Self> {
        let folded = fold_accents(&label.trim().to_lowercase());
        let category = match folded.as_str() {
            "engine" | "motor" => Self::Engine,
            "brakes" | "brake" | "frenos" | "freno" => Self::Brakes,
            "suspension" => Self::Suspension,
            "electrical" | "electric" | "electrico" | "electricidad" | "electrica" => {
                Self::Electrical
            }
            "body" | "carroceria" => Self::Body,
            "transmission" | "transmision" | "caja de cambios" => Self::Transmission,
            "interior" | "interiores" => Self::Interior,
            "other" | "otro" | "otros" | "otra" => Self::Other,
            _ => return None,
        };
        Some(category)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "Engine",
            Self::Brakes => "Brakes",
            Self::Suspension => "Suspension",
            Self::Electrical => "Electrical",
            Self::Body => "Body",
            Self::Transmission => "Transmission",
            Self::Interior => "Interior",
            Self::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_label(value).ok_or_else(|| ValidationError::InvalidCategory {
            value: value.to_owned(),
        })
    }
}

fn fold_accents(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// One normalized listing.
///
/// `price` is in whole Chilean pesos; `0` means the seller did not publish a
/// price ("contact seller").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repuesto {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub image_url: String,
    pub description: String,
    pub url: String,
    pub store: Store,
    pub brand: String,
    pub model: String,
    pub category: Category,
    pub scraped_at: UtcDateTime,
}
