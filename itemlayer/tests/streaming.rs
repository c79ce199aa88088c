use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::time::Duration;

use itemlayer::{contract::default_list_projection, memory::InMemoryStore, prelude::*};

async fn seeded(count: usize) -> DocumentStore<InMemoryStore> {
    let store = DocumentStore::open(InMemoryStore::builder().batch_size(2))
        .await
        .unwrap();

    let items = store.repository::<Item>();
    for i in 0..count {
        items.create(json!({ "name": format!("item-{i}"), "price": i })).await.unwrap();
    }

    store
}

#[tokio::test]
async fn streams_yield_every_document_across_chunks() {
    let store = seeded(5).await;

    let names = store
        .repository::<Item>()
        .stream()
        .await
        .unwrap()
        .map_ok(|record| record.body.name)
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    assert_eq!(names, ["item-0", "item-1", "item-2", "item-3", "item-4"]);
    assert_eq!(store.backend().open_cursors(), 0);
}

#[tokio::test]
async fn partial_iteration_releases_the_cursor() {
    let store = seeded(6).await;
    let items = store.repository::<Item>();

    for _ in 0..10 {
        let mut stream = items.stream().await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(store.backend().open_cursors(), 1);
        drop(stream);
        assert_eq!(store.backend().open_cursors(), 0);
    }

    for _ in 0..10 {
        let mut stream = items.stream_projected(default_list_projection()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.id.as_str().is_empty());
        stream.close();
    }

    assert_eq!(store.backend().open_cursors(), 0);
}

#[tokio::test]
async fn exhausted_streams_release_before_being_dropped() {
    let store = seeded(3).await;

    let mut stream = store.repository::<Item>().stream().await.unwrap();
    while stream.next().await.is_some() {}

    assert!(stream.is_released());
    assert_eq!(store.backend().open_cursors(), 0);
}

#[tokio::test]
async fn cancelled_consumers_release_the_cursor() {
    let store = seeded(4).await;

    let consumer = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut stream = store.repository::<Item>().stream().await.unwrap();
            stream.next().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
    };

    while store.backend().open_cursors() == 0 {
        tokio::task::yield_now().await;
    }

    consumer.abort();
    assert!(consumer.await.unwrap_err().is_cancelled());
    assert_eq!(store.backend().open_cursors(), 0);
}

#[tokio::test]
async fn streams_pull_chunks_lazily() {
    let store = seeded(4).await;
    let items = store.repository::<Item>();

    let mut stream = items.stream().await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.body.name, "item-0");

    items
        .update_many(None, json!({ "name": "renamed", "price": 100 }))
        .await
        .unwrap();

    // The first chunk of two was pulled before the update, the second one after it.
    let rest = stream
        .map_ok(|record| (record.body.name, record.body.price))
        .try_collect::<Vec<_>>()
        .await
        .unwrap();

    assert_eq!(
        rest,
        [
            ("item-1".to_string(), 1.0),
            ("renamed".to_string(), 100.0),
            ("renamed".to_string(), 100.0),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_document_updates_are_never_torn() {
    let store = DocumentStore::open(InMemoryStore::builder()).await.unwrap();
    let id = store
        .repository::<Item>()
        .create(json!({ "name": "v0", "price": 0 }))
        .await
        .unwrap()
        .id;

    let mut tasks = Vec::new();

    for i in 1..=50 {
        let store = store.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            store
                .repository::<Item>()
                .update(&id, json!({ "name": format!("v{i}"), "price": i }))
                .await
                .unwrap();
        }));
    }

    for _ in 0..50 {
        let store = store.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let item = store.repository::<Item>().get(&id).await.unwrap().unwrap().body;
            assert_eq!(item.name, format!("v{}", item.price as i64));
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_racing_a_batch_update_see_whole_documents() {
    let store = seeded(20).await;

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .repository::<Item>()
                .update_many(None, json!({ "description": "sale", "price": 1 }))
                .await
                .unwrap()
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            let records = store.repository::<Item>().list_all().await.unwrap();

            // Some documents may already be updated and others not, but each one is
            // either entirely old or entirely new.
            for record in records {
                let item = record.body;
                match item.description.as_deref() {
                    Some("sale") => assert_eq!(item.price, 1.0),
                    None => {
                        let original = item.name.trim_start_matches("item-").parse::<f64>().unwrap();
                        assert_eq!(item.price, original);
                    }
                    Some(other) => panic!("unexpected description {other}"),
                }
            }
        })
    };

    assert_eq!(writer.await.unwrap().matched_count, 20);
    reader.await.unwrap();
}
