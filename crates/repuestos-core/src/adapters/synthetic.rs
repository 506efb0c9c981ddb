use crate::data_source::{PartSource, SourceError, SourceFuture};
use crate::normalize::{normalize, RawItem, SyntheticItem};
use crate::{Repuesto, SearchQuery, SourceId, Store};

const DEFAULT_BASE_PRICE: u64 = 40_000;

/// Base price in CLP by keyword; first match wins.
const PRICE_TABLE: [(&[&str], u64); 10] = [
    (&["filtro", "filter"], 8_000),
    (&["aceite", "oil"], 25_000),
    (&["pastilla", "brake pad"], 30_000),
    (&["bujia", "bujía", "spark"], 6_000),
    (&["amortiguador", "shock"], 45_000),
    (&["bomba de agua", "water pump"], 55_000),
    (&["radiador", "radiator"], 90_000),
    (&["alternador", "alternator"], 120_000),
    (&["bateria", "batería", "battery"], 80_000),
    (&["embrague", "clutch"], 150_000),
];

const VARIANTS: [&str; 5] = ["Original", "Alternative", "Premium", "Economy", "OEM"];
const STORES: [Store; 3] = [Store::Marketplace, Store::SpecialtyRetailer, Store::ClassifiedsSite];

/// Maximum relative deviation from the base price, in percent.
pub const JITTER_PERCENT: i64 = 20;

/// Deterministic approximate listings used when every live source came back empty.
///
/// Prices derive from a keyword table with a bounded jitter seeded by the
/// query, so the same query always yields the same listings.
#[derive(Debug, Clone)]
pub struct SyntheticAdapter {
    count: usize,
}

impl Default for SyntheticAdapter {
    fn default() -> Self {
        Self { count: 5 }
    }
}

impl SyntheticAdapter {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn listings(&self, query: &SearchQuery) -> Vec<Repuesto> {
        let base = base_price(query.piece());
        let mut rng = fastrand::Rng::with_seed(query_seed(query));

        (0..self.count)
            .map(|position| {
                let percent = 100 + rng.i64(-JITTER_PERCENT..=JITTER_PERCENT);
                let price = u64::try_from(percent).unwrap_or(100) * base / 100;
                let store = STORES[position % STORES.len()];
                let variant = VARIANTS[position % VARIANTS.len()];
                let item = SyntheticItem {
                    name: format!("{} {} - {variant}", query.piece(), query.model()),
                    price,
                    store,
                    description: format!("Approximate price at {}", store.display_name()),
                };
                normalize(RawItem::Synthetic(item), query, SourceId::Synthetic, position)
            })
            .collect()
    }
}

impl PartSource for SyntheticAdapter {
    fn id(&self) -> SourceId {
        SourceId::Synthetic
    }

    fn fetch<'a>(
        &'a self,
        query: &'a SearchQuery,
    ) -> SourceFuture<'a, Result<Vec<Repuesto>, SourceError>> {
        Box::pin(async move { Ok(self.listings(query)) })
    }
}

pub fn base_price(piece: &str) -> u64 {
    let piece = piece.to_lowercase();
    PRICE_TABLE
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| piece.contains(keyword)))
        .map_or(DEFAULT_BASE_PRICE, |(_, price)| *price)
}

fn query_seed(query: &SearchQuery) -> u64 {
    query
        .normalized_key_material()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |acc, byte| {
            (acc ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}
