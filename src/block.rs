use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{ChannelError, InvalidOptionValue};
use crate::message::option::BlockValue;

/// Splits a payload into sequential blocks for a Block1/Block2
/// transfer. The caller owns the pacing: block N+1 goes out only after
/// the acknowledgment for block N has come back.
///
/// An empty payload still produces one empty final block, so every
/// transfer has at least one message on the wire.
pub fn split_payload(
    payload: &[u8],
    block_size: usize,
) -> Result<Vec<(BlockValue, &[u8])>, InvalidOptionValue> {
    if payload.is_empty() {
        return Ok(vec![(BlockValue::new(0, false, block_size)?, payload)]);
    }

    let chunks: Vec<&[u8]> = payload.chunks(block_size).collect();
    let last = chunks.len() - 1;
    let mut blocks = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        // Fails once the payload needs more block numbers than the
        // 20 bit field can carry.
        let block = BlockValue::new(i as u32, i < last, block_size)?;
        blocks.push((block, chunk));
    }
    Ok(blocks)
}

/// Fragments of one inbound transfer, keyed by block sequence number.
struct BlockAssembly {
    fragments: BTreeMap<u32, Vec<u8>>,
    last_touched: Instant,
}

type AssemblyKey = (SocketAddr, Vec<u8>);

/// Reassembles fragmented inbound payloads, keyed by (peer, token).
/// Retransmitted blocks overwrite their slot; a final block with a gap
/// behind it discards the whole assembly.
pub struct BlockwiseManager {
    assemblies: HashMap<AssemblyKey, BlockAssembly>,
    idle_timeout: Duration,
}

impl BlockwiseManager {
    pub fn new(idle_timeout: Duration) -> BlockwiseManager {
        BlockwiseManager {
            assemblies: HashMap::new(),
            idle_timeout,
        }
    }

    /// Stores one inbound fragment. Returns `Ok(Some(payload))` when the
    /// final block completes the transfer, `Ok(None)` for intermediate
    /// blocks, and `IncompleteTransfer` when the final block reveals a
    /// gap (the assembly is discarded either way).
    pub fn store(
        &mut self,
        peer: SocketAddr,
        token: &[u8],
        block: &BlockValue,
        fragment: Vec<u8>,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, ChannelError> {
        let key: AssemblyKey = (peer, token.to_vec());
        let assembly = self
            .assemblies
            .entry(key.clone())
            .or_insert_with(|| BlockAssembly {
                fragments: BTreeMap::new(),
                last_touched: now,
            });

        // Last write wins: retransmitted blocks are expected.
        assembly.fragments.insert(block.num, fragment);
        assembly.last_touched = now;

        if block.more {
            return Ok(None);
        }

        let assembly = self
            .assemblies
            .remove(&key)
            .expect("assembly inserted above");

        let mut payload = Vec::new();
        for (expected, (&sequence, fragment)) in assembly.fragments.iter().enumerate() {
            if sequence != expected as u32 {
                debug!(
                    "reassembly gap from {}: expected block {}, found {}",
                    peer, expected, sequence
                );
                return Err(ChannelError::IncompleteTransfer {
                    peer,
                    token: token.to_vec(),
                });
            }
            payload.extend_from_slice(fragment);
        }
        Ok(Some(payload))
    }

    /// Drops assemblies that have not seen a block for the idle timeout.
    pub fn evict_idle(&mut self, now: Instant) {
        let idle_timeout = self.idle_timeout;
        self.assemblies
            .retain(|_, a| now.duration_since(a.last_touched) < idle_timeout);
    }

    pub fn clear(&mut self) {
        self.assemblies.clear();
    }
}
