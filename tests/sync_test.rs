//! Node replication over an in-memory hub

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use synchaus::prelude::*;
use synchaus::sync::JsonRow;

use common::WAIT;

async fn insert_accounts(engine: &Engine, emails: impl IntoIterator<Item = String>) {
    for email in emails {
        engine
            .table("accounts")
            .insert([("email", email.to_db_value())])
            .await
            .unwrap();
    }
}

async fn nickname(engine: &Engine, email: &str) -> Option<DbValue> {
    engine
        .table("accounts")
        .filter("email", args![email])
        .no_cache()
        .one()
        .await
        .ok()
        .and_then(|row| row.get("nickname").cloned())
}

async fn wait_for_nickname(engine: &Engine, email: &str, expected: DbValue) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if nickname(engine, email).await.as_ref() == Some(&expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn row(value: serde_json::Value) -> JsonRow {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_join_then_live_changes() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();
    insert_accounts(&a, (0..3).map(|i| format!("u{}@x.y", i))).await;

    let b = common::node(&hub, &dir, "node-b").await;
    b.sync().unwrap().join("node-a").await.unwrap();

    assert!(common::wait_for_count(&b, "accounts", 3).await);
    let table = b.get_table("accounts", "").await.unwrap();
    assert_eq!(table.pk, "id");
    assert!(a.sync().unwrap().node("node-b").unwrap().active);

    insert_accounts(&a, ["new@x.y".to_string()]).await;
    assert!(common::wait_for_count(&b, "accounts", 4).await);

    a.table("accounts")
        .filter("email", args!["new@x.y"])
        .set("nickname", args!["newbie"])
        .await
        .unwrap();
    assert!(
        wait_for_nickname(&b, "new@x.y", DbValue::Text("newbie".into())).await
    );

    a.table("accounts")
        .filter("email", args!["u0@x.y"])
        .delete()
        .await
        .unwrap();
    assert!(common::wait_for_count(&b, "accounts", 3).await);

    a.table("accounts").drop().await.unwrap();
    assert!(
        common::wait_for_table(&b, "accounts", false).await
    );

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_is_paged() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();
    insert_accounts(&a, (0..120).map(|i| format!("u{}@x.y", i))).await;

    let b = common::node(&hub, &dir, "node-b").await;
    let pages = Arc::new(AtomicUsize::new(0));
    let seen = pages.clone();
    b.context().bus.subscribe(
        &b.config().signal.sync_topic,
        handler(move |message: BusMessage| {
            let seen = seen.clone();
            async move {
                if message.get("mtype") == Some(&json!("sync_data"))
                    && message.get("table") == Some(&json!("accounts"))
                {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        }),
    );

    b.sync().unwrap().join("node-a").await.unwrap();
    assert!(common::wait_for_count(&b, "accounts", 120).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pages.load(Ordering::SeqCst), 3);

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn test_replayed_messages_are_idempotent() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();
    let b = common::node(&hub, &dir, "node-b").await;
    let sync_b = b.sync().unwrap();
    sync_b.join("node-a").await.unwrap();
    assert!(
        common::wait_for_table(&b, "accounts", true).await
    );

    let insert = SyncMessage::InsertRec {
        from: "node-x".into(),
        table: "accounts".into(),
        pk: "id".into(),
        data: row(json!({"id": 7, "email": "seven@x.y", "nickname": null})),
    };
    sync_b.apply_message(insert.clone()).await;
    sync_b.apply_message(insert).await;
    assert_eq!(common::count(&b, "accounts").await, 1);

    let update = SyncMessage::UpdateRec {
        from: "node-x".into(),
        table: "accounts".into(),
        pk: "id".into(),
        data: row(json!({"id": 7, "email": "seven@x.y", "nickname": "sev"})),
        old: None,
    };
    sync_b.apply_message(update.clone()).await;
    sync_b.apply_message(update).await;
    assert_eq!(common::count(&b, "accounts").await, 1);
    assert_eq!(
        nickname(&b, "seven@x.y").await,
        Some(DbValue::Text("sev".into()))
    );

    let page = SyncMessage::SyncData {
        from: "node-x".into(),
        table: "accounts".into(),
        page: 1,
        rows: vec![
            row(json!({"id": 7, "email": "seven@x.y", "nickname": "sev"})),
            row(json!({"id": 8, "email": "eight@x.y", "nickname": null})),
        ],
    };
    sync_b.apply_message(page.clone()).await;
    sync_b.apply_message(page).await;
    assert_eq!(common::count(&b, "accounts").await, 2);

    // applied changes are not forwarded back out
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(common::count(&a, "accounts").await, 0);

    // local changes on the joiner are
    insert_accounts(&b, ["local@x.y".to_string()]).await;
    assert!(common::wait_for_count(&a, "accounts", 1).await);

    let delete = SyncMessage::DeleteRec {
        from: "node-x".into(),
        table: "accounts".into(),
        pk: "id".into(),
        data: row(json!({"id": 8})),
    };
    sync_b.apply_message(delete.clone()).await;
    sync_b.apply_message(delete).await;
    assert_eq!(common::count(&b, "accounts").await, 2);

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn test_offline_node_catches_up() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();
    insert_accounts(&a, ["first@x.y".to_string()]).await;

    let b = common::node(&hub, &dir, "node-b").await;
    b.sync().unwrap().join("node-a").await.unwrap();
    assert!(common::wait_for_count(&b, "accounts", 1).await);

    hub.disconnect("node-b");
    insert_accounts(&a, ["second@x.y".to_string(), "third@x.y".to_string()]).await;
    assert!(
        common::eventually(WAIT, || {
            a.sync()
                .and_then(|sync| sync.node("node-b"))
                .is_some_and(|n| !n.active)
        })
        .await
    );
    assert_eq!(common::count(&b, "accounts").await, 1);

    hub.reconnect("node-b");
    assert!(common::wait_for_count(&b, "accounts", 3).await);
    assert!(a.sync().unwrap().node("node-b").unwrap().active);

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn test_leave_and_restart_requests() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();
    let b = common::node(&hub, &dir, "node-b").await;
    let sync_a = a.sync().unwrap();
    let sync_b = b.sync().unwrap();
    sync_b.join("node-a").await.unwrap();
    assert!(
        common::eventually(WAIT, || {
            sync_a.node("node-b").is_some_and(|n| n.active)
        })
        .await
    );

    let restarted = Arc::new(AtomicBool::new(false));
    let flag = restarted.clone();
    sync_a.on_restart(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    sync_b.request_restart("node-a").await.unwrap();
    assert!(common::eventually(WAIT, || restarted.load(Ordering::SeqCst)).await);

    sync_b.leave().await;
    assert!(sync_b.nodes().iter().all(|n| !n.active));
    b.shutdown().await;
    assert!(
        common::eventually(WAIT, || {
            sync_a.node("node-b").is_some_and(|n| !n.active)
        })
        .await
    );

    a.shutdown().await;
}

#[tokio::test]
async fn test_dashboard_receives_applied_changes() {
    let hub = InMemoryHub::new();
    let dir = tempfile::tempdir().unwrap();
    let a = common::node(&hub, &dir, "node-a").await;
    a.migrate_schema("", &common::accounts_schema()).await.unwrap();

    let mut sync = common::sync_config("node-b");
    sync.dashboard_topic = Some("dashboard".into());
    let b = common::node_with(&hub, &dir, "node-b", sync).await;

    let copies = Arc::new(AtomicUsize::new(0));
    let seen = copies.clone();
    b.context().bus.subscribe(
        "dashboard",
        handler(move |message: BusMessage| {
            let seen = seen.clone();
            async move {
                if message.get("mtype") == Some(&json!("insert_rec")) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        }),
    );

    b.sync().unwrap().join("node-a").await.unwrap();
    assert!(
        common::wait_for_table(&b, "accounts", true).await
    );
    insert_accounts(&a, ["watched@x.y".to_string()]).await;
    assert!(common::eventually(WAIT, || copies.load(Ordering::SeqCst) == 1).await);

    b.shutdown().await;
    a.shutdown().await;
}
