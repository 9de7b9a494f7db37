//! Integration tests for notification delivery over HTTP.
//!
//! Each test runs a wiremock endpoint and delivers a real notification to
//! it through the shared client.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use dss_core::DeploymentStage;
use dss_notify::{
    memory::StaticResolver, DeliveryClient, DeliveryError, HttpSignature, NewNotification,
    Notification, NotifyError, NotifySettings,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn settings() -> NotifySettings {
    NotifySettings { stage: DeploymentStage::Dev, default_attempts: 3 }
}

async fn notification(new: NewNotification) -> Notification {
    Notification::create(new, &settings(), &StaticResolver::new())
        .await
        .expect("dev stage accepts any http URL")
}

async fn json_notification(server: &MockServer) -> Notification {
    notification(NewNotification::new(
        "n-1",
        "sub-1",
        format!("{}/callback", server.uri()),
        json!({"bundle_uuid": "b1", "bundle_version": "v1"}),
    ))
    .await
}

fn client() -> DeliveryClient {
    DeliveryClient::with_defaults().expect("default client builds")
}

#[tokio::test]
async fn delivers_json_body_with_attempt_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback"))
        .and(header("x-dss-notify-attempt", "1"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delivered = json_notification(&server).await.deliver(&client(), None, Some(1)).await;
    assert!(delivered);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({"bundle_uuid": "b1", "bundle_version": "v1"}));
}

#[tokio::test]
async fn attempt_header_omitted_without_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(204)).mount(&server).await;

    assert!(json_notification(&server).await.deliver(&client(), None, None).await);

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("x-dss-notify-attempt"));
}

#[tokio::test]
async fn server_error_reported_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let notification = json_notification(&server).await;
    assert!(!notification.deliver(&client(), None, Some(1)).await);

    let error = notification.deliver_or_raise(&client(), None, Some(1)).await.unwrap_err();
    match error {
        NotifyError::Delivery(DeliveryError::ServerError { status_code, .. }) => {
            assert_eq!(status_code, 500)
        },
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_raised_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such hook"))
        .mount(&server)
        .await;

    let error = json_notification(&server).await.deliver_or_raise(&client(), None, None).await;
    assert_eq!(
        error.unwrap_err(),
        NotifyError::Delivery(DeliveryError::client_error(404, "no such hook"))
    );
}

#[tokio::test]
async fn redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(path("/callback"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/elsewhere", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let notification = json_notification(&server).await;
    assert!(!notification.deliver(&client(), None, None).await);
    assert_eq!(
        notification.deliver_or_raise(&client(), None, None).await.unwrap_err(),
        NotifyError::Delivery(DeliveryError::UnexpectedStatus { status_code: 302 })
    );
}

#[tokio::test]
async fn connection_refused_reported_as_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let notification = notification(NewNotification::new(
        "n-1",
        "sub-1",
        format!("http://127.0.0.1:{port}/callback"),
        json!({}),
    ))
    .await;

    assert!(!notification.deliver(&client(), Some(Duration::from_secs(2)), None).await);
    let error = notification.deliver_or_raise(&client(), Some(Duration::from_secs(2)), None).await;
    assert!(matches!(error, Err(NotifyError::Delivery(DeliveryError::NetworkError { .. }))));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let error = json_notification(&server)
        .await
        .deliver_or_raise(&client(), Some(Duration::from_millis(100)), None)
        .await
        .unwrap_err();
    assert_eq!(error, NotifyError::Delivery(DeliveryError::timeout(100)));
}

#[tokio::test]
async fn keyed_notification_signed_verifiably() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(header_exists("authorization"))
        .and(header_exists("digest"))
        .and(header_exists("date"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notification = notification(NewNotification {
        method: "PUT".to_string(),
        hmac_key: Some(b"shared-secret".to_vec()),
        hmac_key_id: Some("sub-1-key".to_string()),
        ..NewNotification::new("n-1", "sub-1", format!("{}/callback?x=1", server.uri()), json!({"a": 1}))
    })
    .await;
    assert!(notification.deliver(&client(), None, Some(2)).await);

    let request = &server.received_requests().await.unwrap()[0];
    let authorization = request.headers["authorization"].to_str().unwrap();
    assert!(authorization.contains("keyId=\"sub-1-key\""));

    let receiver = HttpSignature::new(b"shared-secret".to_vec(), None);
    assert!(receiver.verify(&request.method, &request.url, &request.headers, &request.body));

    let impostor = HttpSignature::new(b"guessed".to_vec(), None);
    assert!(!impostor.verify(&request.method, &request.url, &request.headers, &request.body));
}

#[tokio::test]
async fn multipart_notification_carries_form_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let endpoint = dss_notify::Endpoint {
        encoding: "multipart/form-data".to_string(),
        form_fields: [("foo".to_string(), "bar".to_string())].into_iter().collect(),
        ..dss_notify::Endpoint::new(format!("{}/form", server.uri()))
    };
    let body = endpoint.notification_body(&json!({"bundle_uuid": "b1"})).unwrap();
    let notification = notification(NewNotification {
        encoding: endpoint.encoding.clone(),
        ..NewNotification::new("n-2", "sub-2", endpoint.callback_url.clone().unwrap(), body)
    })
    .await;
    assert!(notification.deliver(&client(), None, None).await);

    let request = &server.received_requests().await.unwrap()[0];
    let content_type = request.headers["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let text = String::from_utf8(request.body.clone()).unwrap();
    assert!(text.contains("name=\"foo\"\r\n\r\nbar\r\n"));
    assert!(text.contains("name=\"payload\"\r\n\r\n{\"bundle_uuid\":\"b1\"}\r\n"));
}

#[tokio::test]
async fn round_tripped_notification_still_delivers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-dss-notify-attempt", "3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let original = json_notification(&server).await;
    let message = original.to_wire_message(&dss_core::RealClock::new());
    let restored = Notification::from_wire_message(&message).unwrap();

    assert_eq!(restored.body().unwrap(), original.body().unwrap());
    assert!(restored.deliver(&client(), None, Some(3)).await);
}
