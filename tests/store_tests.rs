use std::sync::Arc;
use std::time::Duration;

use msgdb::{
    Error, MessageKind, Msg, QuotedInfo, SqliteStore, StoredGroupMessage, StoredMessage,
    StoredMessageAttribute, StoredPrivateMessage,
};
use serde_json::json;

fn text(s: &str) -> Msg {
    let mut msg = Msg::new();
    msg.insert("type".to_string(), json!("text"));
    msg.insert("data".to_string(), json!({ "text": s }));
    msg
}

fn attribute(uin: i64, name: &str, seq: i32) -> StoredMessageAttribute {
    StoredMessageAttribute {
        message_seq: seq,
        internal_id: 11,
        sender_uin: uin,
        sender_name: name.to_string(),
        timestamp: 1_700_000_000 + seq as i64,
    }
}

fn group_message(global_id: i32) -> StoredGroupMessage {
    StoredGroupMessage {
        id: 1000 + global_id as i64,
        global_id,
        attribute: Some(attribute(10001, "alice", global_id)),
        sub_type: "normal".to_string(),
        quoted_info: Some(QuotedInfo {
            prev_id: "msg-41".to_string(),
            prev_global_id: 41,
            quoted_content: vec![text("the original")],
        }),
        group_code: 987654,
        anonymous_id: String::new(),
        content: vec![text("hello group")],
    }
}

fn private_message(global_id: i32) -> StoredPrivateMessage {
    StoredPrivateMessage {
        id: 2000 + global_id as i64,
        global_id,
        attribute: Some(attribute(20001, "bob", global_id)),
        sub_type: "friend".to_string(),
        quoted_info: None,
        session_uin: 20001,
        target_uin: 30001,
        content: vec![text("hello friend")],
    }
}

fn open_temp() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_in_dir(&dir.path().join("data").join("sqlite3"), Duration::from_secs(3600)).unwrap();
    (dir, store)
}

#[test]
fn test_open_creates_directory_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_dir = dir.path().join("nested").join("sqlite3");
    assert!(!db_dir.exists());

    SqliteStore::open_in_dir(&db_dir, Duration::from_secs(60)).unwrap();
    assert!(db_dir.join("msg.db").exists());
}

#[test]
fn test_reopen_is_idempotent_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("msg.db");

    {
        let store = SqliteStore::open(&path, Duration::ZERO).unwrap();
        store.insert_group_message(&group_message(1)).unwrap();
    }

    let store = SqliteStore::open(&path, Duration::ZERO).unwrap();
    let msg = store.get_group_message_by_global_id(1).unwrap();
    assert_eq!(msg.content, vec![text("hello group")]);
    assert_eq!(store.stats().unwrap().group_messages, 1);
}

#[test]
fn test_group_round_trip() {
    let (_dir, store) = open_temp();
    let inserted = group_message(42);
    store.insert_group_message(&inserted).unwrap();

    let fetched = store.get_group_message_by_global_id(42).unwrap();
    assert_eq!(fetched, inserted);

    let attr = fetched.attribute.unwrap();
    assert_eq!(attr.sender_name, "alice");
    assert_eq!(attr.sender_uin, 10001);
    assert_eq!(attr.message_seq, 42);
    assert_eq!(attr.timestamp, 1_700_000_042);

    let quote = fetched.quoted_info.unwrap();
    assert_eq!(quote.prev_id, "msg-41");
    assert_eq!(quote.prev_global_id, 41);
    assert_eq!(quote.quoted_content, vec![text("the original")]);
}

#[test]
fn test_private_round_trip() {
    let (_dir, store) = open_temp();
    let inserted = private_message(7);
    store.insert_private_message(&inserted).unwrap();

    let fetched = store.get_private_message_by_global_id(7).unwrap();
    assert_eq!(fetched, inserted);
    assert!(fetched.quoted_info.is_none());
}

#[test]
fn test_message_without_attribute_or_quote() {
    let (_dir, store) = open_temp();
    let msg = StoredGroupMessage {
        attribute: None,
        quoted_info: None,
        ..group_message(3)
    };
    store.insert_group_message(&msg).unwrap();

    let fetched = store.get_group_message_by_global_id(3).unwrap();
    assert!(fetched.attribute.is_none());
    assert!(fetched.quoted_info.is_none());
    assert_eq!(store.stats().unwrap().attributes, 0);
}

#[test]
fn test_dual_kind_fallback_to_private() {
    let (_dir, store) = open_temp();
    store.insert_private_message(&private_message(77)).unwrap();

    let found = store.get_message_by_global_id(77).unwrap();
    assert_eq!(found.kind(), MessageKind::Private);
    assert!(matches!(found, StoredMessage::Private(ref m) if m.target_uin == 30001));
}

#[test]
fn test_dual_kind_prefers_group() {
    let (_dir, store) = open_temp();
    store.insert_group_message(&group_message(5)).unwrap();
    store.insert_private_message(&private_message(5)).unwrap();

    let found = store.get_message_by_global_id(5).unwrap();
    assert_eq!(found.kind(), MessageKind::Group);
    assert_eq!(store.get_private_message_by_global_id(5).unwrap().session_uin, 20001);
}

#[test]
fn test_lookup_miss_is_not_found() {
    let (_dir, store) = open_temp();

    let err = store.get_group_message_by_global_id(404).unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: MessageKind::Group, global_id: 404 }));

    let err = store.get_message_by_global_id(404).unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: MessageKind::Private, .. }));
}

#[test]
fn test_duplicate_global_id_rejected() {
    let (_dir, store) = open_temp();
    store.insert_group_message(&group_message(9)).unwrap();

    let other = StoredGroupMessage {
        group_code: 111,
        content: vec![text("imposter")],
        ..group_message(9)
    };
    let err = store.insert_group_message(&other).unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));

    let kept = store.get_group_message_by_global_id(9).unwrap();
    assert_eq!(kept.group_code, 987654);
    assert_eq!(kept.content, vec![text("hello group")]);
}

#[test]
fn test_identical_attributes_and_quotes_share_rows() {
    let (_dir, store) = open_temp();
    let shared_attr = attribute(10001, "alice", 1);
    for global_id in 1..=3 {
        let msg = StoredGroupMessage {
            attribute: Some(shared_attr.clone()),
            ..group_message(global_id)
        };
        store.insert_group_message(&msg).unwrap();
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.group_messages, 3);
    assert_eq!(stats.attributes, 1);
    assert_eq!(stats.quotes, 1);
    assert_eq!(stats.senders, 1);
}

#[test]
fn test_sender_rename_shows_latest_name() {
    let (_dir, store) = open_temp();
    store.insert_group_message(&group_message(1)).unwrap();

    let renamed = StoredGroupMessage {
        attribute: Some(attribute(10001, "alice2", 2)),
        ..group_message(2)
    };
    store.insert_group_message(&renamed).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.senders, 1);
    assert_eq!(stats.attributes, 2);
    assert_eq!(
        store.get_group_message_by_global_id(2).unwrap().attribute.unwrap().sender_name,
        "alice2"
    );
}

#[test]
fn test_group_and_private_share_attribute_rows() {
    let (_dir, store) = open_temp();
    let attr = attribute(20001, "bob", 8);
    store
        .insert_group_message(&StoredGroupMessage { attribute: Some(attr.clone()), ..group_message(8) })
        .unwrap();
    store.insert_private_message(&private_message(8)).unwrap();

    assert_eq!(store.stats().unwrap().attributes, 1);
}

#[test]
fn test_written_rows_visible_to_concurrent_readers() {
    let (_dir, store) = open_temp();
    let store = Arc::new(store);
    const WRITES: i32 = 200;

    std::thread::scope(|scope| {
        let writer = Arc::clone(&store);
        scope.spawn(move || {
            for global_id in 1..=WRITES {
                writer.insert_group_message(&group_message(global_id)).unwrap();
                // Once insert returns, a read issued afterwards sees the row
                assert!(writer.get_group_message_by_global_id(global_id).is_ok());
            }
        });

        for _ in 0..4 {
            let reader = Arc::clone(&store);
            scope.spawn(move || {
                for round in 0..WRITES * 2 {
                    let global_id = round % WRITES + 1;
                    if let Ok(msg) = reader.get_group_message_by_global_id(global_id) {
                        let attr = msg.attribute.expect("envelope visible without its attribute");
                        assert_eq!(attr.message_seq, global_id);
                        assert!(msg.quoted_info.is_some());
                    }
                }
            });
        }
    });

    assert_eq!(store.stats().unwrap().group_messages, WRITES as usize);
}
