//! Integration tests for the notification store against a mock backend
//!
//! ## Running Tests
//! ```bash
//! cargo test -p sincronica-client --test notifications_flow
//! ```

use std::sync::Arc;
use std::time::Duration;

use sincronica_client::{Config, NotificationStore};
use sincronica_shared::UserId;

fn notifications_body(read_flags: &[bool]) -> String {
    let items: Vec<String> = read_flags
        .iter()
        .enumerate()
        .map(|(i, read)| {
            format!(
                r#"{{"id": {}, "userId": 42, "title": "Aviso", "message": "Clase de sincro",
                    "type": "warning", "isRead": {}, "createdAt": "2024-05-0{}T10:00:00Z"}}"#,
                i + 1,
                read,
                i + 1
            )
        })
        .collect();
    format!("[{}]", items.join(","))
}

fn store(server: &mockito::Server) -> NotificationStore {
    let mut config = Config::new(&server.url()).unwrap();
    config.notifications_retries = 0;
    NotificationStore::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_mark_all_read_clears_unread_count() {
    let mut server = mockito::Server::new_async().await;
    let before = server
        .mock("GET", "/api/notifications/42")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(notifications_body(&[true, false, true, false, true]))
        .expect(1)
        .create_async()
        .await;
    let mark_all = server
        .mock("PUT", "/api/notifications/read-all/42")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let store = store(&server);
    store.set_user(Some(UserId::new(42).unwrap()));

    assert_eq!(store.notifications().await.unwrap().len(), 5);
    assert_eq!(store.unread_count().await.unwrap(), 2);
    before.assert_async().await;

    // Backend now reports everything read
    before.remove_async().await;
    let after = server
        .mock("GET", "/api/notifications/42")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(notifications_body(&[true, true, true, true, true]))
        .expect(1)
        .create_async()
        .await;

    store.mark_all_read().await.unwrap();
    assert_eq!(store.unread_count().await.unwrap(), 0);

    mark_all.assert_async().await;
    after.assert_async().await;
}

#[tokio::test]
async fn test_polling_refreshes_cache() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/notifications/42")
        .with_status(200)
        .with_body(notifications_body(&[false, false, false]))
        .create_async()
        .await;

    let store = Arc::new(store(&server));
    store.set_user(Some(UserId::new(42).unwrap()));
    assert_eq!(store.cached_unread_count(), None);

    let poller = Arc::clone(&store).spawn_polling(Duration::from_millis(20));
    for _ in 0..100 {
        if store.cached_unread_count().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    poller.abort();

    assert_eq!(store.cached_unread_count(), Some(3));
}

#[tokio::test]
async fn test_polling_survives_failures() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/api/notifications/42")
        .with_status(500)
        .expect_at_least(2)
        .create_async()
        .await;

    let store = Arc::new(store(&server));
    store.set_user(Some(UserId::new(42).unwrap()));

    let poller = Arc::clone(&store).spawn_polling(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!poller.is_finished());
    poller.abort();
    failing.assert_async().await;
    assert_eq!(store.cached_unread_count(), None);
}
