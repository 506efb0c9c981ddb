use std::sync::Arc;

use repuestos_core::{
    GenerativeAdapter, HttpAuth, HttpResponse, MarketplaceAdapter, PartSource, ScriptedHttpClient,
    SearchQuery, SourceErrorKind, SourceId, Store, SyntheticAdapter,
};
use serde_json::json;

#[derive(Clone)]
struct SourceCase {
    id: SourceId,
    source: Arc<dyn PartSource>,
    live: bool,
}

fn source_cases(catalog: HttpResponse, generative: HttpResponse) -> Vec<SourceCase> {
    let catalog_http = Arc::new(ScriptedHttpClient::always(catalog));
    let generative_http = Arc::new(ScriptedHttpClient::always(generative));

    vec![
        SourceCase {
            id: SourceId::Marketplace,
            source: Arc::new(MarketplaceAdapter::marketplace(catalog_http.clone(), HttpAuth::None)),
            live: true,
        },
        SourceCase {
            id: SourceId::Classifieds,
            source: Arc::new(MarketplaceAdapter::classifieds(catalog_http, HttpAuth::None)),
            live: true,
        },
        SourceCase {
            id: SourceId::Generative,
            source: Arc::new(
                GenerativeAdapter::new(generative_http, Some(String::from("test-key")))
                    .with_grounding(false),
            ),
            live: true,
        },
        SourceCase {
            id: SourceId::Synthetic,
            source: Arc::new(SyntheticAdapter::default()),
            live: false,
        },
    ]
}

fn healthy_cases() -> Vec<SourceCase> {
    let catalog = json!({
        "results": [
            {"id": "MLC10", "title": "Amortiguador delantero", "price": 54990, "permalink": "https://articulo.mercadolibre.cl/MLC10", "thumbnail": "http://http2.mlstatic.com/D_10-I.jpg"},
            {"id": "MLC11", "title": "Amortiguador Monroe", "price": "$62.000", "permalink": "https://articulo.mercadolibre.cl/MLC11"},
            {"id": "MLC12", "title": "", "price": null}
        ]
    });
    let answer = json!([
        {"name": "Amortiguador KYB", "price": 58990, "store": "AutoPlanet", "url": "https://www.autoplanet.cl/p/1"},
        {"nombre": "Amortiguador Gabriel", "precio": "$49.990", "tienda": "MercadoLibre"},
        {"title": "Amortiguador usado", "price": "35000", "store": "Yapo", "url": "javascript:alert(1)"}
    ]);
    let envelope = json!({"candidates": [{"content": {"parts": [{"text": format!("```json\n{answer}\n```")}]}}]});

    source_cases(
        HttpResponse::ok_json(catalog.to_string()),
        HttpResponse::ok_json(envelope.to_string()),
    )
}

fn query() -> SearchQuery {
    SearchQuery::new("amortiguador", "Chevrolet Sail 2016").expect("valid query")
}

#[tokio::test]
async fn listings_are_normalized_for_all_sources() {
    let query = query();

    for case in healthy_cases() {
        assert_eq!(case.source.id(), case.id, "source '{}': id", case.id);
        let listings = case
            .source
            .fetch(&query)
            .await
            .unwrap_or_else(|error| panic!("source '{}' fetch failed: {error}", case.id));
        assert!(!listings.is_empty(), "source '{}': listings", case.id);

        for listing in &listings {
            assert_eq!(
                SourceId::from_listing_id(&listing.id),
                Some(case.id),
                "source '{}': id prefix of {}",
                case.id,
                listing.id
            );
            assert!(!listing.name.is_empty(), "source '{}': name", case.id);
            assert!(listing.url.starts_with("https://"), "source '{}': url {}", case.id, listing.url);
            assert!(
                listing.image_url.starts_with("https://"),
                "source '{}': image {}",
                case.id,
                listing.image_url
            );
            assert_eq!(listing.model, "Chevrolet Sail 2016", "source '{}': model", case.id);
            assert!(!listing.brand.is_empty(), "source '{}': brand", case.id);
        }
    }
}

#[tokio::test]
async fn store_family_follows_the_source() {
    let query = query();

    for case in healthy_cases() {
        let listings = case.source.search(&query).await;
        match case.id {
            SourceId::Marketplace => {
                assert!(listings.iter().all(|listing| listing.store == Store::Marketplace));
            }
            SourceId::Classifieds => {
                assert!(listings.iter().all(|listing| listing.store == Store::ClassifiedsSite));
            }
            SourceId::Generative => {
                let stores = listings.iter().map(|listing| listing.store).collect::<Vec<_>>();
                assert_eq!(
                    stores,
                    vec![Store::SpecialtyRetailer, Store::Marketplace, Store::ClassifiedsSite]
                );
            }
            SourceId::Synthetic => {
                assert_eq!(listings.len(), 5);
                assert!(listings.iter().all(|listing| listing.store != Store::Other));
            }
        }
    }
}

#[tokio::test]
async fn upstream_failures_are_typed_on_fetch_and_swallowed_on_search() {
    let query = query();
    let cases = source_cases(
        HttpResponse::new(500, "internal error"),
        HttpResponse::new(500, "internal error"),
    );

    for case in cases {
        if !case.live {
            continue;
        }
        let error = case
            .source
            .fetch(&query)
            .await
            .expect_err("500 must fail the fetch");
        assert_eq!(error.kind(), SourceErrorKind::Internal, "source '{}': kind", case.id);
        assert!(!error.retryable(), "source '{}': retryable", case.id);

        assert!(
            case.source.search(&query).await.is_empty(),
            "source '{}': search must swallow the failure",
            case.id
        );
    }
}

#[tokio::test]
async fn unexpected_payloads_are_malformed_on_fetch_and_empty_on_search() {
    let query = query();
    let cases = source_cases(HttpResponse::ok_json("null"), HttpResponse::ok_json("[]"));

    for case in cases.into_iter().filter(|case| case.live) {
        let error = case
            .source
            .fetch(&query)
            .await
            .expect_err("unexpected payload must fail the fetch");
        assert_eq!(
            error.kind(),
            SourceErrorKind::MalformedResponse,
            "source '{}': kind",
            case.id
        );
        assert!(!error.kind().is_fatal(), "source '{}': fatal", case.id);
        assert!(case.source.search(&query).await.is_empty(), "source '{}': listings", case.id);
    }
}
