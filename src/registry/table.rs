//! Append-only node table.
//!
//! Nodes are addressed by their [`NodeId`], a dense index. The table grows in
//! chunks of doubling size that are never moved or copied once allocated, so
//! an append costs the same no matter how many nodes exist:
//!
//! ```text
//!   chunk 0: 32 slots    ids    0 ..   31
//!   chunk 1: 64 slots    ids   32 ..   95
//!   chunk 2: 128 slots   ids   96 ..  223
//!   ...
//! ```
//!
//! Readers never lock: a slot below the published length is always filled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::registry::node::{NodeData, NodeId};

const FIRST_CHUNK_BITS: u32 = 5;
const FIRST_CHUNK: usize = 1 << FIRST_CHUNK_BITS;
const CHUNKS: usize = (usize::BITS - FIRST_CHUNK_BITS) as usize;

type Chunk = Box<[OnceLock<Arc<NodeData>>]>;

/// Maps a table index to `(chunk, offset)`.
#[inline]
fn locate(index: usize) -> (usize, usize) {
    let biased = index + FIRST_CHUNK;
    let chunk = (usize::BITS - 1 - biased.leading_zeros() - FIRST_CHUNK_BITS) as usize;
    (chunk, biased - (FIRST_CHUNK << chunk))
}

pub(crate) struct NodeTable {
    chunks: [OnceLock<Chunk>; CHUNKS],
    len: AtomicUsize,
}

impl NodeTable {
    pub(crate) fn new() -> Self {
        NodeTable {
            chunks: std::array::from_fn(|_| OnceLock::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of published nodes.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<NodeData>> {
        if id.0 >= self.len() {
            return None;
        }
        let (chunk, offset) = locate(id.0);
        self.chunks[chunk].get()?.get(offset)?.get().cloned()
    }

    /// Builds the next node with its id and publishes it.
    ///
    /// Appends must be serialized by the caller (the registrar's structural
    /// lock); reads may run concurrently.
    pub(crate) fn push_with(&self, build: impl FnOnce(NodeId) -> NodeData) -> Arc<NodeData> {
        let index = self.len.load(Ordering::Relaxed);
        let (chunk, offset) = locate(index);
        let slots = self.chunks[chunk].get_or_init(|| {
            (0..FIRST_CHUNK << chunk).map(|_| OnceLock::new()).collect()
        });

        let node = Arc::new(build(NodeId(index)));
        let _ = slots[offset].set(Arc::clone(&node));
        self.len.store(index + 1, Ordering::Release);
        node
    }
}
