//! Integration tests for encoded values.
//!
//! Remote stores hold envelope bytes rather than objects. These tests run the
//! orchestrator over a memory store that encodes like a remote one, so the
//! codec path is covered without a server.

use cacher::serialization::{serialize_for_cache, Codec, CACHE_MAGIC};
use cacher::store::{MemoryStore, Store};
use cacher::{CacheOptions, CacheValue, Cacher, Error, Value, NO_FALLBACK};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Product {
    id: String,
    name: String,
    price: f64,
    tags: Vec<String>,
}

fn product(id: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        price: 9.99,
        tags: vec!["sale".to_string(), "新品".to_string()],
    }
}

/// Memory store that encodes values like a byte-oriented store.
#[derive(Clone)]
struct EncodingStore {
    inner: MemoryStore,
    codec: Codec,
}

impl EncodingStore {
    fn new(codec: Codec) -> Self {
        EncodingStore {
            inner: MemoryStore::new(),
            codec,
        }
    }

    async fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.inner
            .store_many(
                vec![(key.to_string(), Value::from_bytes(self.codec, bytes))],
                Duration::ZERO,
            )
            .await
            .expect("Failed to store raw bytes");
    }
}

impl Store for EncodingStore {
    fn to_value<T: CacheValue>(&self, value: &T) -> cacher::Result<Value> {
        Value::encode(self.codec, value)
    }

    async fn load(&self, key: &str) -> cacher::Result<Option<Value>> {
        self.inner.load(key).await
    }

    async fn store_many(&self, items: Vec<(String, Value)>, ttl: Duration) -> cacher::Result<()> {
        self.inner.store_many(items, ttl).await
    }

    async fn del(&self, keys: &[&str]) -> cacher::Result<i64> {
        self.inner.del(keys).await
    }
}

#[tokio::test]
async fn test_write_back_is_encoded_with_envelope() {
    for codec in [Codec::Json, Codec::Postcard] {
        let store = EncodingStore::new(codec);
        let cacher = Cacher::new(store.clone());
        let load = |id: String| async move { Ok::<_, Error>(Some(product(&id))) };

        let mut first: Option<Product> = None;
        assert!(cacher
            .get("p1", &mut first, Some(&load), CacheOptions::default())
            .await
            .expect("Miss should be served by the fallback"));

        let raw = store
            .load("p1")
            .await
            .expect("Failed to load")
            .expect("Value should be written back");
        let bytes = raw.as_bytes().expect("Value should be encoded");
        assert!(!bytes.is_empty());
        if codec == Codec::Postcard {
            assert_eq!(&bytes[..4], &CACHE_MAGIC);
        }

        let mut second: Option<Product> = None;
        assert!(cacher
            .get("p1", &mut second, NO_FALLBACK, CacheOptions::default())
            .await
            .expect("Second read should hit"));
        assert_eq!(first, second, "codec {} must round-trip", codec);
    }
}

#[tokio::test]
async fn test_batch_read_decodes_each_entry() {
    let store = EncodingStore::new(Codec::Postcard);
    let items: HashMap<String, Product> = ["a", "b"]
        .iter()
        .map(|id| (id.to_string(), product(id)))
        .collect();
    store
        .mset(&items, Duration::ZERO)
        .await
        .expect("Failed to set");

    let cacher = Cacher::new(store);
    let mut dst: HashMap<String, Product> = HashMap::new();
    cacher
        .mget(&["a", "b", "c"], &mut dst, NO_FALLBACK, CacheOptions::default())
        .await
        .expect("Batch read should succeed");

    assert_eq!(dst, items);
}

#[tokio::test]
async fn test_json_reads_compatible_types() {
    let store = EncodingStore::new(Codec::Json);
    let items = HashMap::from([("n".to_string(), 42_u8)]);
    store
        .mset(&items, Duration::ZERO)
        .await
        .expect("Failed to set");

    let mut wide: Option<u64> = None;
    assert!(store.get("n", &mut wide).await.expect("Widening should succeed"));
    assert_eq!(wide, Some(42));

    let mut text: Option<String> = None;
    let err = store.get("n", &mut text).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));
}

#[tokio::test]
async fn test_postcard_is_strict_about_types() {
    let store = EncodingStore::new(Codec::Postcard);
    let items = HashMap::from([("n".to_string(), 42_u8)]);
    store
        .mset(&items, Duration::ZERO)
        .await
        .expect("Failed to set");

    let mut exact: Option<u8> = None;
    assert!(store.get("n", &mut exact).await.expect("Exact type should succeed"));
    assert_eq!(exact, Some(42));

    let mut other: Option<u64> = None;
    let err = store.get("n", &mut other).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));
}

#[tokio::test]
async fn test_corrupt_entry_fails_the_read() {
    let store = EncodingStore::new(Codec::Postcard);
    store.put_raw("bad", b"not an envelope".to_vec()).await;
    let cacher = Cacher::new(store);
    let load = |_id: String| async move { Ok::<_, Error>(Some(product("fresh"))) };

    let mut dst: Option<Product> = None;
    let err = cacher
        .get("bad", &mut dst, Some(&load), CacheOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InvalidCacheEntry(_) | Error::DeserializationError(_)
    ));
    assert!(dst.is_none());
}

#[tokio::test]
async fn test_refresh_replaces_stale_schema_entry() {
    let store = EncodingStore::new(Codec::Json);
    let stale = serialize_for_cache(Codec::Json, &"old layout").expect("Failed to encode");
    store.put_raw("p1", stale).await;
    let cacher = Cacher::new(store);

    let load = |ids: Vec<String>| async move {
        let found: HashMap<String, Product> = ids.iter().map(|id| (id.clone(), product(id))).collect();
        Ok::<_, Error>(found)
    };

    let mut dst: HashMap<String, Product> = HashMap::new();
    cacher
        .mrefresh(&["p1"], &mut dst, Some(&load), CacheOptions::default())
        .await
        .expect("Refresh should succeed");

    let mut after: Option<Product> = None;
    assert!(cacher
        .get("p1", &mut after, NO_FALLBACK, CacheOptions::default())
        .await
        .expect("Refreshed entry should decode"));
    assert_eq!(after, Some(product("p1")));
}
