#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Key-value store seam for the Lekhak worker.
//!
//! The queue protocol the worker relies on is small: blocking multi-queue
//! pop, list push, hash get/set, atomic increment, set add/remove/size, and
//! key expiry. [`KvStore`] captures exactly that surface so pipelines and
//! the worker loop stay independent of the transport; the Redis adapter in
//! [`redis_store`] is the production implementation and the in-memory store
//! in `lekhak-test-support` backs the tests.
//!
//! The bounded-backoff [`retry`] primitive lives here too since its main
//! consumers are KV and blob-store calls.

pub mod error;
pub mod redis_store;
pub mod retry;
pub mod store;

pub use error::{KvError, KvResult};
pub use redis_store::RedisKvStore;
pub use retry::{RetryPolicy, run_with_retry};
pub use store::KvStore;
