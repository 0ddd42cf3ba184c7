//! The store is used through `Arc<dyn ChatStore>` from many tasks at once.

use std::sync::Arc;

use mm_store::{ChatStore, HistoryEntry, MemoryStore, Speaker};

#[tokio::test]
async fn concurrent_writers_are_all_visible() {
    let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::in_memory());

    let mut handles = Vec::new();
    for user in 0..8i64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                store.adjust_reputation(1, user, 1).await.unwrap();
            }
            store
                .append_history(1, HistoryEntry::user(user, format!("u{user}"), "hi"))
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let scores = store.reputations(1).await.unwrap();
    assert_eq!(scores.len(), 8);
    assert!(scores.iter().all(|(_, s)| *s == 10));
    assert_eq!(store.recent_history(1, 100).await.unwrap().len(), 8);
}

#[tokio::test]
async fn agent_lines_carry_no_user() {
    let store = MemoryStore::in_memory();
    store
        .append_history(5, HistoryEntry::agent("Murmur", "hello"))
        .await
        .unwrap();
    let h = store.recent_history(5, 1).await.unwrap();
    assert_eq!(h[0].speaker, Speaker::Agent);
    assert!(h[0].user_id.is_none());
}
