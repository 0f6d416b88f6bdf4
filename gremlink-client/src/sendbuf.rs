//! # Frame Buffer Pool
//!
//! Purpose: Reuse write buffers pre-seeded with the frame's content-type
//! header, so the hot send path neither reallocates nor re-encodes the
//! prefix.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Buffers cycle through get/put; a returned
//!    buffer is reset to exactly the prefix before reuse.
//! 2. **One Pool Per Content Type**: The registry creates each pool at
//!    most once, behind a double-checked read-lock fast path.
//! 3. **Explicit Handle**: The registry is passed into constructors;
//!    there is no process-wide mutable global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bytes::BytesMut;

/// Registry of frame buffer pools keyed by content-type string.
///
/// Cloning shares the same underlying map; every connection built from
/// the same registry and content type shares one pool.
#[derive(Debug, Clone, Default)]
pub struct BufferRegistry {
    pools: Arc<RwLock<HashMap<String, Arc<SendBufferPool>>>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool for a content type, creating it on first use.
    pub fn pool(&self, mime_type: &str) -> Arc<SendBufferPool> {
        {
            let pools = self.pools.read().expect("registry lock poisoned");
            if let Some(pool) = pools.get(mime_type) {
                return pool.clone();
            }
        }

        let mut pools = self.pools.write().expect("registry lock poisoned");
        pools
            .entry(mime_type.to_string())
            .or_insert_with(|| Arc::new(SendBufferPool::new(mime_type)))
            .clone()
    }
}

/// Pool of frame buffers for one content type.
///
/// Each buffer starts with `[len: u8][content-type bytes]`; the request
/// body is appended after the prefix and the whole buffer goes out as one
/// binary message.
#[derive(Debug)]
pub struct SendBufferPool {
    prefix: Vec<u8>,
    buffers: Mutex<Vec<BytesMut>>,
}

impl SendBufferPool {
    /// Builds a pool for the given content type. The caller validates the
    /// 255-byte limit; see `Connection::dial`.
    pub fn new(mime_type: &str) -> Self {
        let mut prefix = Vec::with_capacity(mime_type.len() + 1);
        prefix.push(mime_type.len() as u8);
        prefix.extend_from_slice(mime_type.as_bytes());

        SendBufferPool {
            prefix,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// The frame prefix every buffer starts with.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Takes a buffer containing only the frame prefix.
    pub fn get(&self) -> BytesMut {
        let reused = self
            .buffers
            .lock()
            .expect("pool lock poisoned")
            .pop();
        match reused {
            Some(buf) => buf,
            None => BytesMut::from(&self.prefix[..]),
        }
    }

    /// Returns a buffer, resetting it to the prefix for the next user.
    pub fn put(&self, mut buf: BytesMut) {
        buf.truncate(self.prefix.len());
        self.buffers.lock().expect("pool lock poisoned").push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_start_with_prefix() {
        let pool = SendBufferPool::new("application/json");
        let buf = pool.get();
        assert_eq!(buf[0] as usize, "application/json".len());
        assert_eq!(&buf[1..], b"application/json");
    }

    #[test]
    fn reused_buffers_reset_to_prefix() {
        let pool = SendBufferPool::new("application/json");
        let prefix = pool.prefix().to_vec();

        for pass in 0..25 {
            let mut buf = pool.get();
            assert_eq!(&buf[..], &prefix[..], "pass {}", pass);
            buf.extend_from_slice(format!("{{\"pass\":{}}}", pass).as_bytes());
            assert!(buf.starts_with(&prefix));
            pool.put(buf);
        }
    }

    #[test]
    fn registry_hands_out_one_pool_per_content_type() {
        let registry = BufferRegistry::new();
        let a = registry.pool("application/json");
        let b = registry.pool("application/json");
        let c = registry.pool("application/vnd.gremlin-v2.0+json");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn cloned_registries_share_pools() {
        let registry = BufferRegistry::new();
        let clone = registry.clone();
        let a = registry.pool("application/json");
        let b = clone.pool("application/json");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
