//! # Normalizer
//!
//! Total mapping from raw upstream items into [`Repuesto`] listings.
//!
//! Every missing or malformed field is replaced by a default, so
//! [`normalize`] never fails:
//!
//! | Field | Default |
//! |-------|---------|
//! | `price` | `0` ("contact seller") |
//! | `imageUrl` | [`PLACEHOLDER_IMAGE_URL`] |
//! | `brand` | [`DEFAULT_BRAND`] |
//! | `category` | query category, else [`Category::Other`] |
//! | `description` | seller label derived from the store |
//! | `url` | store search link for the listing name |

use serde::Deserialize;

use crate::{Category, Repuesto, SearchQuery, SourceId, Store, UtcDateTime};

pub const PLACEHOLDER_IMAGE_URL: &str = "https://placehold.co/200x200?text=Sin+Imagen";
pub const DEFAULT_BRAND: &str = "Generic";
pub const PRIVATE_SELLER: &str = "Private seller";

const MARKETPLACE_NAME: &str = "MercadoLibre";
const GOOGLE_LOGO_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/c/c1/Google_%22G%22_logo.svg/768px-Google_%22G%22_logo.svg.png";

/// Id of the search-link entry appended to every result set.
pub const GOOGLE_SHOPPING_ID: &str = "google-shopping";

/// Upstream price as received: a JSON number or free text such as `"$35.000"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Amount(f64),
    Text(String),
}

impl RawPrice {
    /// Whole-peso price. Text keeps only its digits; anything unparsable,
    /// negative or non-finite becomes `0`.
    pub fn to_clp(&self) -> u64 {
        match self {
            Self::Amount(value) if value.is_finite() && *value > 0.0 => {
                // Saturating float-to-int cast.
                value.round() as u64
            }
            Self::Amount(_) => 0,
            Self::Text(text) => {
                let digits = text
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect::<String>();
                digits.parse().unwrap_or(0)
            }
        }
    }
}

/// Seller block of a marketplace catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarketplaceSeller {
    #[serde(default, deserialize_with = "lenient::text")]
    pub nickname: Option<String>,
}

/// Attribute pair of a marketplace catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketplaceAttribute {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub value_name: Option<String>,
}

/// One entry of a marketplace catalog search response.
///
/// A field of the wrong type decodes as absent instead of failing the item.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarketplaceItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub price: Option<RawPrice>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub permalink: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub seller: Option<MarketplaceSeller>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub attributes: Vec<MarketplaceAttribute>,
}

impl MarketplaceItem {
    fn brand(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.id.as_deref() == Some("BRAND"))
            .and_then(|attribute| attribute.value_name.as_deref())
    }
}

/// One listing emitted by the text-generating upstream.
///
/// Field names are accepted in English or Spanish since the model does not
/// always follow the requested schema. Mistyped fields decode as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedItem {
    #[serde(alias = "nombre", alias = "title", alias = "titulo", deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(alias = "precio", deserialize_with = "lenient::optional")]
    pub price: Option<RawPrice>,
    #[serde(alias = "tienda", deserialize_with = "lenient::text")]
    pub store: Option<String>,
    #[serde(alias = "link", alias = "enlace", deserialize_with = "lenient::text")]
    pub url: Option<String>,
    #[serde(alias = "image", alias = "imagen", alias = "image_url", deserialize_with = "lenient::text")]
    pub image_url: Option<String>,
    #[serde(alias = "descripcion", deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(alias = "marca", deserialize_with = "lenient::text")]
    pub brand: Option<String>,
    #[serde(alias = "categoria", deserialize_with = "lenient::text")]
    pub category: Option<String>,
}

/// Field decoders that map a type mismatch to "absent".
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings as-is, numbers in their JSON form, anything else `None`.
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    pub fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
    }

    /// Keeps the array elements that decode; a non-array is an empty list.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(values) => values
                .into_iter()
                .filter_map(|value| serde_json::from_value(value).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

/// Locally fabricated fallback listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticItem {
    pub name: String,
    pub price: u64,
    pub store: Store,
    pub description: String,
}

/// Raw item, tagged by the kind of upstream that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Marketplace(MarketplaceItem),
    Generated(GeneratedItem),
    Synthetic(SyntheticItem),
}

/// Normalizes one raw item into a listing.
///
/// `source` decides the id prefix and, for marketplace items, the store
/// family; `position` is the item's index in its upstream response and is
/// used whenever the upstream did not supply an id.
pub fn normalize(raw: RawItem, query: &SearchQuery, source: SourceId, position: usize) -> Repuesto {
    match raw {
        RawItem::Marketplace(item) => normalize_marketplace(item, query, source, position),
        RawItem::Generated(item) => normalize_generated(item, query, source, position),
        RawItem::Synthetic(item) => normalize_synthetic(item, query, source, position),
    }
}

fn normalize_marketplace(
    item: MarketplaceItem,
    query: &SearchQuery,
    source: SourceId,
    position: usize,
) -> Repuesto {
    let classifieds = source == SourceId::Classifieds;
    let store = if classifieds {
        Store::ClassifiedsSite
    } else {
        Store::Marketplace
    };

    let upstream_id = non_blank(item.id.as_deref()).map(str::to_owned);
    let id = match upstream_id {
        Some(upstream_id) => format!("{}-{upstream_id}", source.id_prefix()),
        None => format!("{}-{position}", source.id_prefix()),
    };
    let name = listing_name(item.title.as_deref(), query);

    let image_url = non_blank(item.thumbnail.as_deref())
        .map(|thumbnail| upgrade_thumbnail(thumbnail, !classifieds))
        .unwrap_or_else(|| String::from(PLACEHOLDER_IMAGE_URL));

    let description = if classifieds {
        String::from(PRIVATE_SELLER)
    } else {
        let nickname = item
            .seller
            .as_ref()
            .and_then(|seller| non_blank(seller.nickname.as_deref()))
            .unwrap_or(MARKETPLACE_NAME);
        format!("Seller: {nickname}")
    };

    let brand = if classifieds {
        String::from(DEFAULT_BRAND)
    } else {
        non_blank(item.brand())
            .unwrap_or(DEFAULT_BRAND)
            .to_owned()
    };

    let url = http_url(item.permalink.as_deref())
        .unwrap_or_else(|| store_search_url(store, &name));

    Repuesto {
        id,
        price: item.price.as_ref().map_or(0, RawPrice::to_clp),
        image_url,
        description,
        url,
        store,
        brand,
        model: query.model().to_owned(),
        category: query.category().unwrap_or(Category::Other),
        scraped_at: UtcDateTime::now(),
        name,
    }
}

fn normalize_generated(
    item: GeneratedItem,
    query: &SearchQuery,
    source: SourceId,
    position: usize,
) -> Repuesto {
    let store = Store::from_label(item.store.as_deref().unwrap_or_default());
    let name = listing_name(item.name.as_deref(), query);

    let category = item
        .category
        .as_deref()
        .and_then(Category::from_label)
        .or(query.category())
        .unwrap_or(Category::Other);

    let description = non_blank(item.description.as_deref())
        .map(str::to_owned)
        .unwrap_or_else(|| seller_label(store, item.store.as_deref()));

    let url = http_url(item.url.as_deref()).unwrap_or_else(|| store_search_url(store, &name));

    Repuesto {
        id: format!("{}-{position}", source.id_prefix()),
        price: item.price.as_ref().map_or(0, RawPrice::to_clp),
        image_url: http_url(item.image_url.as_deref())
            .unwrap_or_else(|| String::from(PLACEHOLDER_IMAGE_URL)),
        description,
        url,
        store,
        brand: non_blank(item.brand.as_deref())
            .unwrap_or(DEFAULT_BRAND)
            .to_owned(),
        model: query.model().to_owned(),
        category,
        scraped_at: UtcDateTime::now(),
        name,
    }
}

fn normalize_synthetic(
    item: SyntheticItem,
    query: &SearchQuery,
    source: SourceId,
    position: usize,
) -> Repuesto {
    let name = listing_name(Some(item.name.as_str()), query);
    let description = non_blank(Some(item.description.as_str()))
        .map(str::to_owned)
        .unwrap_or_else(|| seller_label(item.store, None));

    Repuesto {
        id: format!("{}-{position}", source.id_prefix()),
        url: store_search_url(item.store, &name),
        price: item.price,
        image_url: String::from(PLACEHOLDER_IMAGE_URL),
        description,
        store: item.store,
        brand: String::from(DEFAULT_BRAND),
        model: query.model().to_owned(),
        category: query.category().unwrap_or(Category::Other),
        scraped_at: UtcDateTime::now(),
        name,
    }
}

/// Search-link entry appended at the end of every result set.
pub fn google_shopping_entry(query: &SearchQuery) -> Repuesto {
    Repuesto {
        id: String::from(GOOGLE_SHOPPING_ID),
        name: format!("Search \"{}\" on Google", query.piece()),
        price: 0,
        image_url: String::from(GOOGLE_LOGO_URL),
        description: String::from("See web results"),
        url: google_shopping_url(&query.search_text()),
        store: Store::Other,
        brand: String::from("Google"),
        model: query.model().to_owned(),
        category: query.category().unwrap_or(Category::Other),
        scraped_at: UtcDateTime::now(),
    }
}

pub fn google_shopping_url(text: &str) -> String {
    format!(
        "https://www.google.com/search?tbm=shop&q={}",
        urlencoding::encode(text)
    )
}

/// Search page on the given store family for `text`.
pub fn store_search_url(store: Store, text: &str) -> String {
    match store {
        Store::Marketplace => format!(
            "https://listado.mercadolibre.cl/{}",
            urlencoding::encode(&text.trim().replace(' ', "-"))
        ),
        Store::ClassifiedsSite => format!(
            "https://www.yapo.cl/chile?q={}",
            urlencoding::encode(text)
        ),
        Store::SpecialtyRetailer => format!(
            "https://www.autopartners.cl/search?q={}",
            urlencoding::encode(text)
        ),
        Store::Other => google_shopping_url(text),
    }
}

/// Forces https and, for catalog thumbnails, swaps the small `-I` rendition for `-V`.
fn upgrade_thumbnail(thumbnail: &str, larger_variant: bool) -> String {
    let secure = thumbnail.replacen("http://", "https://", 1);
    if larger_variant {
        secure.replacen("-I.jpg", "-V.jpg", 1)
    } else {
        secure
    }
}

fn listing_name(candidate: Option<&str>, query: &SearchQuery) -> String {
    non_blank(candidate)
        .map(str::to_owned)
        .unwrap_or_else(|| query.search_text())
}

fn seller_label(store: Store, raw_store: Option<&str>) -> String {
    let name = non_blank(raw_store).unwrap_or_else(|| store.display_name());
    format!("Seller: {name}")
}

fn http_url(value: Option<&str>) -> Option<String> {
    let value = non_blank(value)?;
    (value.starts_with("https://") || value.starts_with("http://")).then(|| value.to_owned())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
