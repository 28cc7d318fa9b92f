//! Connection lifecycle tests.
//!
//! The unreachable-host tests run anywhere. The rest need a MongoDB server:
//! set MONGODB_URI and run with `--ignored`.

use docstore_mongodb::{
    with_connection, ConnectionHandle, Credentials, DocStoreError, FacadeConfig, Filter,
    RetryConfig,
};
use std::time::{Duration, Instant};
use tokio_test::assert_ok;

fn live_config() -> FacadeConfig {
    let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    FacadeConfig::from_uri(uri)
        .database(format!("docstore_test_{}", bson::oid::ObjectId::new().to_hex()))
        .timeout_ms(2_000)
}

#[tokio::test]
async fn test_unreachable_host_fails_with_connection_error() {
    // Port 1 on loopback is reserved and never runs a MongoDB server
    let config = FacadeConfig::new().host("127.0.0.1", 1).timeout_ms(300);

    let started = Instant::now();
    let result = ConnectionHandle::connect(&config).await;
    let elapsed = started.elapsed();

    match result {
        Err(DocStoreError::Connection(_)) => {}
        other => panic!("expected connection error, got {:?}", other),
    }
    // Bounded by timeout_ms plus scheduling slack
    assert!(elapsed < Duration::from_millis(300) + Duration::from_secs(2), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_unreachable_host_is_retried_then_fails() {
    // Two retries back off 150ms then 300ms; one attempt alone ends within 200ms
    let retry = RetryConfig::exponential(2, 150, 1_000);
    let backoff = retry.delay_for_attempt(0) + retry.delay_for_attempt(1);
    assert_eq!(backoff, Duration::from_millis(450));

    let config = FacadeConfig::new()
        .host("127.0.0.1", 1)
        .timeout_ms(200)
        .retry(retry);

    let started = Instant::now();
    let err = ConnectionHandle::connect(&config).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_retryable());
    assert!(elapsed >= backoff, "gave up after {:?}, before the backoff elapsed", elapsed);
    assert!(elapsed < backoff + Duration::from_secs(6), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_with_connection_propagates_connect_error() {
    let config = FacadeConfig::new().host("127.0.0.1", 1).timeout_ms(200);

    let result: docstore_mongodb::Result<u64> = with_connection(&config, |handle| {
        Box::pin(async move { handle.count("people", Filter::new()).await })
    })
    .await;

    assert!(matches!(result, Err(DocStoreError::Connection(_))));
}

#[tokio::test]
#[ignore] // Requires a running MongoDB server
async fn test_connect_then_close_is_idempotent() {
    let mut handle = ConnectionHandle::connect(&live_config()).await.unwrap();
    assert!(!handle.is_closed());
    assert_ok!(handle.ping().await);

    assert_ok!(handle.close().await);
    assert!(handle.is_closed());
    assert_ok!(handle.close().await);
    assert!(handle.is_closed());
}

#[tokio::test]
#[ignore]
async fn test_operations_after_close_fail() {
    let mut handle = ConnectionHandle::connect(&live_config()).await.unwrap();
    handle.close().await.unwrap();

    assert!(matches!(
        handle.insert("people", bson::doc! { "name": "Ada" }).await,
        Err(DocStoreError::ClosedHandle)
    ));
    assert!(matches!(handle.find("people", Filter::new()), Err(DocStoreError::ClosedHandle)));
    assert!(matches!(
        handle.update("people", Filter::new(), bson::doc! { "name": "Grace" }).await,
        Err(DocStoreError::ClosedHandle)
    ));
    assert!(matches!(
        handle.delete("people", Filter::new()).await,
        Err(DocStoreError::ClosedHandle)
    ));
    assert!(matches!(handle.ping().await, Err(DocStoreError::ClosedHandle)));
}

#[tokio::test]
#[ignore]
async fn test_bad_credentials_fail_with_auth_error() {
    // Only meaningful against a server with authentication enabled
    let config = live_config().credentials(Credentials::new("docstore_nobody", "wrong-password"));

    let result = ConnectionHandle::connect(&config).await;
    assert!(matches!(result, Err(DocStoreError::Auth(_))), "got {:?}", result);
}

#[tokio::test]
#[ignore]
async fn test_with_connection_closes_on_error() {
    let config = live_config();

    let result: docstore_mongodb::Result<()> = with_connection(&config, |handle| {
        Box::pin(async move {
            handle.insert("people", bson::Document::new()).await?;
            Ok(())
        })
    })
    .await;

    assert!(matches!(result, Err(DocStoreError::Validation(_))));
}
