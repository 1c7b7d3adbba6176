//! Integration tests for the dispatch lifecycle
//!
//! Every outcome must release the leased connection exactly once, and proxy
//! detection problems must never abort a request.

mod test_support;

use std::sync::Arc;

use courier_core::http::{
    ApiRequest, DispatchErrorKind, Dispatcher, JsonRequest, ProxyEndpoint, ProxyResolver,
    StaticProxySelector, TransportErrorKind, INVALID_ERROR_FORMAT,
};
use serde::Deserialize;
use test_support::{Behavior, BrokenSelector, FakeTransport, PanickingSelector};

#[derive(Debug, Deserialize, PartialEq)]
struct Ack {
    ok: bool,
}

const URL: &str = "https://mandrillapp.com/api/1.0/messages/send.json";

fn ack_request() -> JsonRequest<Ack> {
    JsonRequest::new(ApiRequest::post_json(URL, &serde_json::json!({"key": "test-key"})).unwrap())
}

fn dispatcher(behavior: Behavior) -> Dispatcher<FakeTransport> {
    Dispatcher::new(FakeTransport::new(behavior), ProxyResolver::direct())
}

#[tokio::test]
async fn test_success_releases_once() {
    let dispatcher = dispatcher(Behavior::respond(200, r#"{"ok":true}"#));

    let ack = dispatcher.execute(&ack_request()).await.unwrap();

    assert_eq!(ack, Ack { ok: true });
    let counters = &dispatcher.transport().counters;
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
}

#[tokio::test]
async fn test_api_error_releases_once() {
    let body = r#"{"status":"error","code":-1,"name":"Invalid_Key","message":"Invalid API key"}"#;
    let dispatcher = dispatcher(Behavior::respond(500, body));

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    assert_eq!(err.kind(), DispatchErrorKind::Api);
    assert!(err.to_string().contains("Unexpected http status in response: 500"));
    assert_eq!(err.api_error().unwrap().name, "Invalid_Key");
    assert_eq!(dispatcher.transport().counters.released(), 1);
}

#[tokio::test]
async fn test_malformed_error_body_releases_once() {
    let dispatcher = dispatcher(Behavior::respond(500, "not json"));

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    let api = err.api_error().unwrap();
    assert_eq!(api.name, INVALID_ERROR_FORMAT);
    assert_eq!(api.message, INVALID_ERROR_FORMAT);
    assert_eq!(api.raw_body, "not json");
    assert_eq!(api.status_code, 500);
    assert_eq!(dispatcher.transport().counters.released(), 1);
}

#[tokio::test]
async fn test_parse_fault_releases_once() {
    let dispatcher = dispatcher(Behavior::respond(200, "PONG!"));

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    assert_eq!(err.kind(), DispatchErrorKind::ResponseParse);
    assert_eq!(err.url(), URL);
    assert_eq!(dispatcher.transport().counters.released(), 1);
}

#[tokio::test]
async fn test_send_fault_releases_once() {
    let dispatcher = dispatcher(Behavior::SendFails);

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    assert_eq!(err.kind(), DispatchErrorKind::Transport);
    assert_eq!(err.transport_error().unwrap().kind(), TransportErrorKind::Connect);
    assert_eq!(dispatcher.transport().counters.acquired(), 1);
    assert_eq!(dispatcher.transport().counters.released(), 1);
}

#[tokio::test]
async fn test_acquire_fault_has_nothing_to_release() {
    let dispatcher = dispatcher(Behavior::AcquireFails);

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    assert_eq!(err.kind(), DispatchErrorKind::Transport);
    assert!(err.transport_error().unwrap().is_timeout());
    assert_eq!(dispatcher.transport().counters.acquired(), 0);
    assert_eq!(dispatcher.transport().counters.released(), 0);
    assert_eq!(dispatcher.transport().counters.sent(), 0);
}

#[tokio::test]
async fn test_release_fault_masks_outcome() {
    let dispatcher = dispatcher(Behavior::ReleaseFails(200, r#"{"ok":true}"#.to_string()));

    let err = dispatcher.execute(&ack_request()).await.unwrap_err();

    assert_eq!(err.kind(), DispatchErrorKind::Release);
    assert_eq!(err.url(), URL);
    assert_eq!(dispatcher.transport().counters.released(), 1);
}

#[tokio::test]
async fn test_repeated_dispatches_balance_leases() {
    let dispatcher = dispatcher(Behavior::respond(200, r#"{"ok":false}"#));

    for _ in 0..10 {
        dispatcher.execute(&ack_request()).await.unwrap();
    }

    let counters = &dispatcher.transport().counters;
    assert_eq!(counters.acquired(), 10);
    assert_eq!(counters.released(), 10);
}

#[tokio::test]
async fn test_failing_selector_does_not_abort_dispatch() {
    let dispatcher = Dispatcher::new(
        FakeTransport::new(Behavior::respond(200, r#"{"ok":true}"#)),
        ProxyResolver::new(Arc::new(BrokenSelector)),
    );

    assert_eq!(dispatcher.execute(&ack_request()).await.unwrap(), Ack { ok: true });
    assert_eq!(dispatcher.transport().counters.acquisitions()[0].proxy, None);
}

#[tokio::test]
async fn test_panicking_selector_does_not_abort_dispatch() {
    let dispatcher = Dispatcher::new(
        FakeTransport::new(Behavior::respond(200, r#"{"ok":true}"#)),
        ProxyResolver::new(Arc::new(PanickingSelector)),
    );

    assert_eq!(dispatcher.execute(&ack_request()).await.unwrap(), Ack { ok: true });
    assert_eq!(dispatcher.transport().counters.acquisitions()[0].proxy, None);
}

#[tokio::test]
async fn test_detected_proxy_is_passed_to_transport() {
    let proxy = ProxyEndpoint::new("proxy.internal", 3128);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(Behavior::respond(200, r#"{"ok":true}"#)),
        ProxyResolver::new(Arc::new(StaticProxySelector::proxy(proxy.clone()))),
    );

    dispatcher.execute(&ack_request()).await.unwrap();

    let acquisitions = dispatcher.transport().counters.acquisitions();
    assert_eq!(acquisitions[0].host, "mandrillapp.com");
    assert_eq!(acquisitions[0].proxy, Some(proxy));
}
