//! # cacher
//!
//! Cache-aside orchestration over pluggable key-value stores.
//!
//! ## Features
//!
//! - **Cache-aside in one call:** read the store, fall back on a miss, write the result back
//! - **Batch aware:** partial hits call the batch fallback with only the missed keys
//! - **Store Agnostic:** in-memory, bounded (moka), Redis, Memcached, or your own [`Store`]
//! - **Typed destinations:** results land in `Option<T>` or `HashMap<String, T>`, checked at runtime
//! - **Forgiving writes:** a failed write-back is logged and reported, never returned
//!
//! ## Quick Start
//!
//! ```
//! use cacher::{CacheOptions, Cacher, Error, store::MemoryStore};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> cacher::Result<()> {
//! let cacher = Cacher::new(MemoryStore::new());
//! let options = CacheOptions::default().with_ttl(Duration::from_secs(60));
//!
//! // Single key: the fallback runs once, later reads are served from the store
//! let load_name = |id: String| async move { Ok::<_, Error>(Some(format!("user-{}", id))) };
//! let mut name: Option<String> = None;
//! assert!(cacher.get("42", &mut name, Some(&load_name), options.clone()).await?);
//! assert_eq!(name.as_deref(), Some("user-42"));
//!
//! // Batch: only the keys the store missed reach the fallback
//! let load_names = |ids: Vec<String>| async move {
//!     let found: HashMap<String, String> =
//!         ids.into_iter().map(|id| (id.clone(), format!("user-{}", id))).collect();
//!     Ok::<_, Error>(found)
//! };
//! let mut names: HashMap<String, String> = HashMap::new();
//! cacher.mget(&["42", "43"], &mut names, Some(&load_names), options).await?;
//! assert_eq!(names.len(), 2);
//!
//! assert_eq!(cacher.mdelete(&["42", "43", "44"]).await?, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### For Web Applications
//!
//! Use [`CacheService`] for easy sharing across tasks:
//!
//! ```ignore
//! let cache = CacheService::new(RedisStore::new(RedisConfig::default()).await?);
//! let cache_clone = cache.clone();  // Cheap - just Arc increment
//! ```

#[macro_use]
extern crate log;

pub mod cacher;
pub mod error;
pub mod fallback;
pub mod observability;
pub mod serialization;
pub mod service;
pub mod store;
pub mod transport;
pub mod value;

// Re-exports for convenience
pub use crate::cacher::{CacheOptions, Cacher};
pub use error::{Error, Result};
pub use fallback::{BatchFallback, Fallback, NoFallback, NO_FALLBACK};
pub use service::CacheService;
pub use store::{MemoryStore, Store};
pub use transport::Destination;
pub use value::{CacheValue, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
