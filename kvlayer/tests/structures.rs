use kvlayer::{bson::doc, memory, prelude::*};

async fn store() -> memory::MemoryConnected {
    memory::initialize(&Settings::default(), None).await.unwrap()
}

/// Exercises a store only through the object-safe union trait.
async fn register_user(store: &dyn StructuredStore, uid: &str, joined: f64) -> KvStoreResult<()> {
    let key = format!("user:{}", uid);

    store.set_object(&key, doc! { "uid": uid, "postcount": 0 }).await?;
    store.sorted_set_add("users:joindate", joined, uid).await?;
    store.set_add("users:online", &[uid]).await?;
    store.list_append("users:recent", uid).await?;

    Ok(())
}

#[tokio::test]
async fn one_contract_across_every_kind() {
    let connected = store().await;
    let store = connected.store();

    for (uid, joined) in [("3", 30.0), ("1", 10.0), ("2", 20.0)] {
        register_user(store, uid, joined).await.unwrap();
    }

    assert_eq!(store.get_sorted_set_range("users:joindate", 0, -1).await.unwrap(), ["1", "2", "3"]);
    assert_eq!(store.get_sorted_set_rev_range("users:joindate", 0, -1).await.unwrap(), ["3", "2", "1"]);
    assert_eq!(store.get_list_range("users:recent", 0, -1).await.unwrap(), ["3", "1", "2"]);
    assert_eq!(store.set_count("users:online").await.unwrap(), 3);
    assert_eq!(store.increment_object_field("user:1", "postcount").await.unwrap(), 1);

    assert_eq!(store.key_type("users:joindate").await.unwrap(), Some(StructureKind::SortedSet));
    assert_eq!(store.key_type("user:1").await.unwrap(), Some(StructureKind::Hash));
    assert_eq!(store.key_type("user:9").await.unwrap(), None);
}

#[tokio::test]
async fn absent_keys_differ_from_absent_members() {
    let connected = store().await;
    let store = connected.store();
    store.sorted_set_add("z", 1.0, "a").await.unwrap();
    store.set_add("s", &["a"]).await.unwrap();

    assert_eq!(store.sorted_set_score("z", "b").await.unwrap(), Lookup::MemberAbsent);
    assert_eq!(store.sorted_set_score("y", "b").await.unwrap(), Lookup::KeyAbsent);
    assert_eq!(store.is_set_member("s", "b").await.unwrap(), Membership::NotMember);
    assert_eq!(store.is_set_member("t", "b").await.unwrap(), Membership::KeyAbsent);

    // Existence is per kind: a set key holds no sorted-set members.
    assert_eq!(store.sorted_set_score("s", "a").await.unwrap(), Lookup::KeyAbsent);

    assert!(store.get_sorted_set_range("y", 0, -1).await.unwrap().is_empty());
    assert!(store.get_list_range("y", 0, -1).await.unwrap().is_empty());
}

#[tokio::test]
async fn expiry_applies_to_the_whole_key() {
    let connected = store().await;
    let store = connected.store();
    store.set_object("user:1", doc! { "username": "alice", "email": "a@example.com" }).await.unwrap();

    store.expire_at("user:1", chrono::Utc::now() - chrono::TimeDelta::seconds(1)).await.unwrap();

    assert!(!store.exists("user:1").await.unwrap());
    assert_eq!(store.get_object("user:1").await.unwrap(), None);
    assert_eq!(store.ttl("user:1").await.unwrap(), Lookup::KeyAbsent);
}

#[tokio::test]
async fn rename_replaces_the_target() {
    let connected = store().await;
    let store = connected.store();
    store.list_append("draft", "a").await.unwrap();
    store.list_append("draft", "b").await.unwrap();
    store.set_add("queue", &["stale"]).await.unwrap();

    store.rename("draft", "queue").await.unwrap();

    assert!(!store.exists("draft").await.unwrap());
    assert_eq!(store.get_list_range("queue", 0, -1).await.unwrap(), ["a", "b"]);
    assert_eq!(store.is_set_member("queue", "stale").await.unwrap(), Membership::KeyAbsent);

    store.rename("draft", "queue").await.unwrap();
    assert_eq!(store.get_list_range("queue", 0, -1).await.unwrap(), ["a", "b"]);
}

#[tokio::test]
async fn ranges_accept_the_widest_bounds() {
    let connected = store().await;
    let store = connected.store();
    store.list_append("recent", "a").await.unwrap();
    store.list_prepend("recent", "b").await.unwrap();
    store.sorted_set_add("z", 1.0, "a").await.unwrap();

    assert_eq!(store.get_list_range("recent", 0, i64::MAX).await.unwrap(), ["b", "a"]);
    assert_eq!(store.get_list_range("recent", i64::MIN, -1).await.unwrap(), ["b", "a"]);
    assert_eq!(store.get_sorted_set_range("z", 0, i64::MAX).await.unwrap(), ["a"]);
}

#[tokio::test]
async fn increments_reject_fractional_values() {
    let connected = store().await;
    let store = connected.store();
    store.set_object("user:1", doc! { "reputation": 1.5, "posts": 2.0 }).await.unwrap();

    assert!(matches!(
        store.increment_object_field("user:1", "reputation").await,
        Err(KvStoreError::InvalidValue(..))
    ));
    assert_eq!(store.get_object_field("user:1", "reputation").await.unwrap(), Lookup::Found(1.5.into()));
    assert_eq!(store.increment_object_field("user:1", "posts").await.unwrap(), 3);
}

#[tokio::test]
async fn search_is_scoped_and_limited() {
    let connected = store().await;
    let store = connected.store();
    for id in ["1", "2", "3"] {
        store.search_index("post", "hello world", id).await.unwrap();
    }

    assert_eq!(store.search("post", "HELLO", 2).await.unwrap(), ["1", "2"]);
    assert!(store.search("topic", "hello", 10).await.unwrap().is_empty());

    store.flush().await.unwrap();
    assert!(store.search("post", "hello", 10).await.unwrap().is_empty());
}
