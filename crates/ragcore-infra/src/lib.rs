//! Infrastructure adapters: the Cache Backend (C1) and Queue Backend (C2)
//! from spec §4.1/§4.2, each with a local (in-process) and a shared
//! (distributed, Redis-backed) implementation selected by configuration.

pub mod cache;
pub mod queue;

pub use cache::{build_cache, Cache, CacheError, MemoryCache, RedisCache};
pub use queue::{build_queue, MemoryQueue, Queue, QueueError, RedisQueue};
