use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use streamverse_protocol::http::USER_HEADER;
use streamverse_protocol::{serde_b64, Envelope};
use streamverse_relay::{router, RelayState, BASE_PATH};

fn app(token: Option<&str>) -> Router {
    router(RelayState::new(token.map(String::from)).shared())
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn envelope(timestamp: u64, recipient: u8) -> Value {
    serde_json::to_value(Envelope {
        encrypted_payload: vec![1, 2, 3],
        encrypted_symmetric_key: vec![4; 80],
        nonce: vec![5; 24],
        recipient_public_key: vec![recipient; 32],
        sender_id: "alice".into(),
        timestamp,
    })
    .unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let app = app(Some("secret"));
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

fn party_request(title: &str, is_public: bool, invited: &[&str]) -> Value {
    json!({
        "title": title,
        "description": "bring snacks",
        "dateTime": "2026-10-16T19:00:00.000Z",
        "movieIds": [603],
        "isPublic": is_public,
        "invitedUserIds": invited,
    })
}

async fn call_as(
    app: &Router,
    method: Method,
    uri: &str,
    user: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, user);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn create_and_fetch_party() {
    let app = app(None);
    let create = format!("{BASE_PATH}/create");
    let (status, body) = call_as(
        &app,
        Method::POST,
        &create,
        "alice",
        Some(party_request("Friday Night", false, &["bob"])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = json_of(&body);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["hostId"], "alice");
    assert_eq!(created["participants"], json!(["alice"]));

    let (status, body) = call(&app, Method::GET, &format!("{BASE_PATH}/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let party = json_of(&body);
    assert_eq!(party["title"], "Friday Night");
    assert_eq!(party["movieIds"], json!([603]));
    assert_eq!(party["invitedUserIds"], json!(["bob"]));
    assert_eq!(party["dateTime"], "2026-10-16T19:00:00.000Z");

    let (status, body) = call(&app, Method::GET, &format!("{BASE_PATH}/missing"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json_of(&body)["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn create_party_requires_title_time_and_movies() {
    let app = app(None);
    let create = format!("{BASE_PATH}/create");

    let no_title = party_request("  ", false, &[]);
    let mut no_time = party_request("Friday Night", false, &[]);
    no_time["dateTime"] = Value::Null;
    let mut no_movies = party_request("Friday Night", false, &[]);
    no_movies["movieIds"] = json!([]);

    for body in [no_title, no_time, no_movies] {
        let (status, _) = call_as(&app, Method::POST, &create, "alice", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // No caller header.
    let (status, body) = call(
        &app,
        Method::POST,
        &create,
        None,
        Some(party_request("Friday Night", false, &[])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&body)["error"].as_str().unwrap().contains(USER_HEADER));
}

#[tokio::test]
async fn invitations_join_and_listings() {
    let app = app(None);
    let (_, body) = call_as(
        &app,
        Method::POST,
        &format!("{BASE_PATH}/create"),
        "alice",
        Some(party_request("Private night", false, &["bob"])),
    )
    .await;
    let private_id = json_of(&body)["id"].as_str().unwrap().to_string();
    let (_, body) = call_as(
        &app,
        Method::POST,
        &format!("{BASE_PATH}/create"),
        "alice",
        Some(party_request("Open night", true, &[])),
    )
    .await;
    let public_id = json_of(&body)["id"].as_str().unwrap().to_string();

    let notifications = format!("{BASE_PATH}/notifications");
    let (status, body) = call_as(&app, Method::GET, &notifications, "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    let pending = json_of(&body);
    assert_eq!(pending[0]["type"], "watchPartyInvite");
    assert_eq!(pending[0]["watchPartyId"], private_id.as_str());

    let (status, body) =
        call_as(&app, Method::POST, &format!("{BASE_PATH}/join/{private_id}"), "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["participants"], json!(["alice", "bob"]));

    let (_, body) = call_as(&app, Method::GET, &notifications, "bob", None).await;
    assert_eq!(json_of(&body), json!([]));

    let (status, _) =
        call_as(&app, Method::POST, &format!("{BASE_PATH}/join/{private_id}"), "mallory", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        call_as(&app, Method::POST, &format!("{BASE_PATH}/join/{public_id}"), "mallory", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        call_as(&app, Method::POST, &format!("{BASE_PATH}/join/nowhere"), "mallory", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call_as(&app, Method::GET, &format!("{BASE_PATH}/user"), "mallory", None).await;
    let mine: Vec<String> = json_of(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(mine, [public_id.clone()]);

    let (status, body) = call(&app, Method::GET, &format!("{BASE_PATH}/public"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let public = json_of(&body);
    assert_eq!(public.as_array().unwrap().len(), 1);
    assert_eq!(public[0]["id"], public_id.as_str());
}

#[tokio::test]
async fn roster_upsert_is_last_write_wins() {
    let app = app(None);
    let users = format!("{BASE_PATH}/cv1/users");

    for (user, byte) in [("alice", 1u8), ("bob", 2), ("alice", 3)] {
        let (status, _) = call(
            &app,
            Method::POST,
            &users,
            None,
            Some(json!({"userId": user, "publicKey": serde_b64::encode(&[byte; 32])})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, body) = call(&app, Method::GET, &users, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let roster = json_of(&body);
    let roster = roster.as_array().unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0]["userId"], "alice");
    assert_eq!(roster[0]["publicKey"], serde_b64::encode(&[3u8; 32]));
    assert_eq!(roster[1]["userId"], "bob");
}

#[tokio::test]
async fn roster_of_unknown_party_is_empty() {
    let app = app(None);
    let (status, body) = call(&app, Method::GET, &format!("{BASE_PATH}/nobody/users"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!([]));
}

#[tokio::test]
async fn roster_rejects_bad_keys() {
    let app = app(None);
    let users = format!("{BASE_PATH}/cv1/users");

    for body in [
        json!({"userId": "alice"}),
        json!({"userId": "alice", "publicKey": "%%%"}),
        json!({"userId": "alice", "publicKey": serde_b64::encode(&[1u8; 16])}),
        json!({"userId": "mallory", "publicKey": serde_b64::encode(&[0u8; 32])}),
        json!({"userId": "", "publicKey": serde_b64::encode(&[1u8; 32])}),
    ] {
        let (status, _) = call(&app, Method::POST, &users, None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn publish_and_list_bundles_in_timestamp_order() {
    let app = app(None);
    let publish = format!("{BASE_PATH}/cv1/message");

    let (status, _) = call(&app, Method::POST, &publish, None, Some(json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut ids = Vec::new();
    for ts in [30u64, 10, 20] {
        let (status, body) = call(
            &app,
            Method::POST,
            &publish,
            None,
            Some(json!({"messages": [envelope(ts, 1), envelope(ts, 2)]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(json_of(&body)["id"].as_str().unwrap().to_string());
    }

    let (status, body) = call(&app, Method::GET, &format!("{BASE_PATH}/cv1/messages"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let bundles = json_of(&body);
    let timestamps: Vec<u64> = bundles
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["messages"][0]["timestamp"].as_u64().unwrap())
        .collect();
    assert_eq!(timestamps, [10, 20, 30]);
    assert_eq!(bundles[0]["id"], ids[1]);
    assert_eq!(bundles[0]["conversationId"], "cv1");
    assert_eq!(bundles[0]["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn publish_rejects_malformed_recipient_key() {
    let app = app(None);
    let mut bad = envelope(1, 1);
    bad["recipientPublicKey"] = json!(serde_b64::encode(&[1u8; 5]));
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("{BASE_PATH}/cv1/message"),
        None,
        Some(json!({"messages": [bad]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bearer_token_enforced_on_api_routes() {
    let app = app(Some("secret"));
    let users = format!("{BASE_PATH}/cv1/users");

    let (status, body) = call(&app, Method::GET, &users, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json_of(&body)["error"].is_string());

    let (status, _) = call(&app, Method::GET, &users, Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, &users, Some("secret"), None).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri(&users)
        .header("authorization", "bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn escaped_conversation_id_is_one_segment() {
    let app = app(None);
    let users = format!("{BASE_PATH}/night%2Fone/users");
    let (status, _) = call(
        &app,
        Method::POST,
        &users,
        None,
        Some(json!({"userId": "alice", "publicKey": serde_b64::encode(&[1u8; 32])})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, Method::GET, &users, None, None).await;
    assert_eq!(json_of(&body).as_array().unwrap().len(), 1);
    let (_, body) = call(&app, Method::GET, &format!("{BASE_PATH}/night/users"), None, None).await;
    assert_eq!(json_of(&body), json!([]));
}
