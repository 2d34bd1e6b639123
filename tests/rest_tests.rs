use bybitx::core::kernel::{RestClient, RestClientBuilder, RestClientConfig};
use bybitx::exchanges::bybit::{build_rest_client, BybitOrderRequest, BybitSetLeverageRequest};
use bybitx::{BybitError, ExchangeConfig};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "0s4stkea3xIc44bYoq";
const SECRET: &str = "test_secret_key";

fn config_for(server: &MockServer) -> ExchangeConfig {
    ExchangeConfig::new(API_KEY.to_string(), SECRET.to_string()).base_url(server.uri())
}

fn hmac_hex(message: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn header_str<'a>(request: &'a wiremock::Request, name: &str) -> &'a str {
    request.headers.get(name).unwrap().to_str().unwrap()
}

fn ok_envelope(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "retCode": 0,
        "retMsg": "OK",
        "result": result,
        "retExtInfo": {},
        "time": 1_658_384_314_791_u64
    }))
}

#[tokio::test]
async fn test_wallet_balance_request_is_signed_over_sent_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/account/wallet-balance"))
        .and(query_param("accountType", "UNIFIED"))
        .and(query_param("coin", "USDT"))
        .and(header("X-BAPI-API-KEY", API_KEY))
        .and(header("X-BAPI-RECV-WINDOW", "5000"))
        .and(header_exists("X-BAPI-TIMESTAMP"))
        .and(header_exists("X-BAPI-SIGN"))
        .respond_with(ok_envelope(json!({
            "list": [{
                "accountType": "UNIFIED",
                "totalEquity": "3.31216591",
                "totalWalletBalance": "3.00326056",
                "totalAvailableBalance": "3.00326056",
                "coin": [{"coin": "USDT", "equity": "1.0", "walletBalance": "1.0", "locked": "0"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    let balance = assert_ok!(client.get_wallet_balance("UNIFIED", Some("USDT")).await);
    assert_eq!(balance.list[0].account_type, "UNIFIED");
    assert_eq!(balance.list[0].coin[0].coin, "USDT");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let query = request.url.query().unwrap();
    assert_eq!(query, "accountType=UNIFIED&coin=USDT");

    let timestamp = header_str(request, "X-BAPI-TIMESTAMP");
    let expected = hmac_hex(&format!("{}{}5000{}", timestamp, API_KEY, query));
    assert_eq!(header_str(request, "X-BAPI-SIGN"), expected);
}

#[tokio::test]
async fn test_post_signs_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ok_envelope(json!({
            "orderId": "1321003749386327552",
            "orderLinkId": "spot-test-postonly"
        })))
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    let order = BybitOrderRequest {
        category: "spot".to_string(),
        symbol: "BTCUSDT".to_string(),
        side: "Buy".to_string(),
        order_type: "Limit".to_string(),
        qty: "0.1".to_string(),
        price: Some("15600".to_string()),
        time_in_force: Some("PostOnly".to_string()),
        order_link_id: Some("spot-test-postonly".to_string()),
    };
    let response = assert_ok!(client.place_order(&order).await);
    assert_eq!(response.order_id, "1321003749386327552");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let body = std::str::from_utf8(&request.body).unwrap();
    let timestamp = header_str(request, "X-BAPI-TIMESTAMP");
    assert_eq!(
        header_str(request, "X-BAPI-SIGN"),
        hmac_hex(&format!("{}{}5000{}", timestamp, API_KEY, body))
    );
    assert!(request.url.query().is_none());
}

#[tokio::test]
async fn test_public_call_is_not_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/time"))
        .respond_with(ok_envelope(json!({
            "timeSecond": "1688639403",
            "timeNano": "1688639403423213947"
        })))
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    let time = assert_ok!(client.get_server_time().await);
    assert_eq!(time.time_second, "1688639403");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("X-BAPI-SIGN").is_none());
}

#[tokio::test]
async fn test_rate_limit_carries_header_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Bapi-Limit", "50")
                .insert_header("X-Bapi-Limit-Status", "0")
                .insert_header("X-Bapi-Limit-Reset-Timestamp", "1672738134824")
                .set_body_json(json!({
                    "retCode": 10006,
                    "retMsg": "Too many visits!",
                    "result": {}
                })),
        )
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    let err = assert_err!(client.get_wallet_balance("UNIFIED", None).await);
    match err {
        BybitError::RateLimitError {
            limit,
            remaining,
            reset_at_ms,
            ..
        } => {
            assert_eq!(limit, Some(50));
            assert_eq!(remaining, Some(0));
            assert_eq!(reset_at_ms, Some(1_672_738_134_824));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_benign_code_is_still_business_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/position/set-leverage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"retCode": 34036, "retMsg": "leverage not modified", "result": {}}),
        ))
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    let request = BybitSetLeverageRequest {
        category: "linear".to_string(),
        symbol: "BTCUSDT".to_string(),
        buy_leverage: "2".to_string(),
        sell_leverage: "2".to_string(),
    };
    let err = assert_err!(client.set_leverage(&request).await);
    assert_eq!(err.business_code(), Some(34036));
    assert!(err.to_string().contains("leverage not modified"));
}

#[tokio::test]
async fn test_forbidden_without_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("<html>403 Forbidden</html>"))
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    assert!(matches!(
        client.get_wallet_balance("UNIFIED", None).await,
        Err(BybitError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_unknown_path() {
    let server = MockServer::start().await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    assert!(matches!(
        client.get_server_time().await,
        Err(BybitError::PathNotFound(_))
    ));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = assert_ok!(build_rest_client(&config_for(&server)));
    assert!(matches!(
        client.get_server_time().await,
        Err(BybitError::DecodeError(_))
    ));
}

#[tokio::test]
async fn test_authenticated_call_without_signer_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok_envelope(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let config = ExchangeConfig::read_only().base_url(server.uri());
    let client = assert_ok!(build_rest_client(&config));
    assert!(matches!(
        client.get_wallet_balance("UNIFIED", None).await,
        Err(BybitError::AuthError(_))
    ));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let rest = assert_ok!(RestClientBuilder::new(RestClientConfig::new(
        "http://127.0.0.1:1".to_string(),
        "bybit".to_string(),
    ))
    .build());

    let err = assert_err!(rest.get("/v5/market/time", &[], false).await);
    assert!(err.is_transport());
}
