//! Tests for the Scryfall price client.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{ScryfallCard, ScryfallClient};
use crate::error::SyncError;
use crate::models::Card;
use crate::pipeline::PriceSource;
use rust_decimal::Decimal;

fn make_card(set_code: &str, collector_number: &str, foil: bool) -> Card {
    Card {
        id: 1,
        name: "Lightning Bolt".to_string(),
        set_code: set_code.to_string(),
        collector_number: collector_number.to_string(),
        foil,
        last_price: None,
    }
}

/// Helper: Scryfall card JSON with the given USD prices.
fn scryfall_card_json(usd: Option<&str>, usd_foil: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "id": "test-uuid-123",
        "name": "Lightning Bolt",
        "set": "lea",
        "set_name": "Limited Edition Alpha",
        "collector_number": "161",
        "rarity": "common",
        "prices": { "usd": usd, "usd_foil": usd_foil, "eur": "9.00", "eur_foil": null }
    })
}

async fn mount_card(server: &MockServer, card_path: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(card_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ── fetch_price ──────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_price_non_foil() {
    let server = MockServer::start().await;
    mount_card(
        &server,
        "/cards/lea/161",
        scryfall_card_json(Some("10.50"), Some("25.00")),
    )
    .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let price = client
        .fetch_price(&make_card("lea", "161", false))
        .await
        .unwrap();

    assert_eq!(price, "10.50".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn fetch_price_foil() {
    let server = MockServer::start().await;
    mount_card(
        &server,
        "/cards/lea/161",
        scryfall_card_json(Some("10.50"), Some("25.00")),
    )
    .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let price = client
        .fetch_price(&make_card("lea", "161", true))
        .await
        .unwrap();

    assert_eq!(price, "25.00".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn fetch_price_lowercases_set_code() {
    let server = MockServer::start().await;
    // The mock expects lowercase "m10"
    mount_card(&server, "/cards/m10/42", scryfall_card_json(Some("1.00"), None)).await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("M10", "42", false)).await;

    assert!(result.is_ok(), "Should match the lowercase path");
}

#[tokio::test]
async fn fetch_price_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/lea/161"))
        .and(header("User-Agent", "D2D-Automations-PriceSync/1.0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(scryfall_card_json(Some("1.00"), None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    client
        .fetch_price(&make_card("lea", "161", false))
        .await
        .unwrap();
}

#[tokio::test]
async fn fetch_price_404_is_card_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/lea/999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "object": "error",
            "status": 404,
            "code": "not_found",
            "details": "No card found with the given set and collector number"
        })))
        .mount(&server)
        .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "999", false)).await;

    match result {
        Err(SyncError::CardNotFound {
            set_code,
            collector_number,
        }) => {
            assert_eq!(set_code, "lea");
            assert_eq!(collector_number, "999");
        }
        other => panic!("Expected SyncError::CardNotFound, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_price_missing_non_foil_price_is_unavailable() {
    let server = MockServer::start().await;
    mount_card(
        &server,
        "/cards/lea/161",
        scryfall_card_json(None, Some("25.00")),
    )
    .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "161", false)).await;

    assert!(matches!(
        result,
        Err(SyncError::PriceUnavailable { foil: false, .. })
    ));
}

#[tokio::test]
async fn fetch_price_missing_foil_price_is_unavailable() {
    let server = MockServer::start().await;
    mount_card(
        &server,
        "/cards/lea/161",
        scryfall_card_json(Some("10.50"), None),
    )
    .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "161", true)).await;

    assert!(matches!(
        result,
        Err(SyncError::PriceUnavailable { foil: true, .. })
    ));
}

#[tokio::test]
async fn fetch_price_server_error_is_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/lea/161"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal server error"))
        .mount(&server)
        .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "161", false)).await;

    match result {
        Err(SyncError::HttpStatus(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("Expected SyncError::HttpStatus, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_price_invalid_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards/lea/161"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"invalid": json}"#))
        .mount(&server)
        .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "161", false)).await;

    assert!(matches!(result, Err(SyncError::Parse(_))));
}

#[tokio::test]
async fn fetch_price_unparseable_price_is_invalid() {
    let server = MockServer::start().await;
    mount_card(
        &server,
        "/cards/lea/161",
        scryfall_card_json(Some("not-a-number"), None),
    )
    .await;

    let client = ScryfallClient::with_base_url(&server.uri());
    let result = client.fetch_price(&make_card("lea", "161", false)).await;

    match result {
        Err(SyncError::InvalidPrice(raw)) => assert_eq!(raw, "not-a-number"),
        other => panic!("Expected SyncError::InvalidPrice, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_price_unreachable_server_is_network_error() {
    // Nothing listens on the discard port
    let client = ScryfallClient::with_base_url("http://127.0.0.1:9");
    let result = client.fetch_price(&make_card("lea", "161", false)).await;

    assert!(matches!(result, Err(SyncError::Network(_))));
}

// ── Deserialization ──────────────────────────────────────────────────

#[test]
fn scryfall_card_without_prices_defaults_to_none() {
    let card_json = r#"{
        "name": "Test Card",
        "set": "tst",
        "collector_number": "1"
    }"#;

    let card: ScryfallCard = serde_json::from_str(card_json).unwrap();
    assert!(card.prices.usd_for(false).is_none());
    assert!(card.prices.usd_for(true).is_none());
}

#[test]
fn usd_for_picks_finish() {
    let card: ScryfallCard =
        serde_json::from_value(scryfall_card_json(Some("1.00"), Some("3.00"))).unwrap();

    assert_eq!(card.prices.usd_for(false), Some("1.00"));
    assert_eq!(card.prices.usd_for(true), Some("3.00"));
    assert_eq!(card.prices.eur.as_deref(), Some("9.00"));
}

// Integration tests (require network access)
#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn fetch_card_integration() {
    let client = ScryfallClient::new();
    let card = client.fetch_card("lea", "161").await.unwrap();

    assert!(card.name.to_lowercase().contains("lightning"));
    assert_eq!(card.set, "lea");
    assert_eq!(card.collector_number, "161");
}
