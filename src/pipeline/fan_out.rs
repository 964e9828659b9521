//! Fan-out of captured blocks to the two channel buffers.
//!
//! The capture callback hands every block to [`FanOut::deliver`]. Each output
//! has a persistent lane thread owning its [`BufferWriter`]; `deliver` passes
//! the block to both lanes and returns once both have written it. The block
//! storage is shared with the lanes and reused, so steady-state delivery
//! does not allocate on the capture thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::pair::{ChannelPair, ChannelRole};
use crate::pipeline::BufferWriter;
use crate::PipeError;

/// Totals of what the capture side produced.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    blocks: AtomicU64,
    bytes: AtomicU64,
}

impl CaptureCounters {
    /// Returns the number of blocks delivered.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes delivered.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn record(&self, bytes: usize) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

struct Lane {
    role: ChannelRole,
    blocks: Option<Sender<Arc<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Lane {
    fn spawn(mut writer: BufferWriter, acks: Sender<ChannelRole>) -> Result<Self, PipeError> {
        let role = writer.role();
        let (blocks, inbox) = crossbeam_channel::bounded::<Arc<Vec<u8>>>(1);

        let handle = thread::Builder::new()
            .name(format!("stereo-split-fanout-{role}"))
            .spawn(move || {
                for block in inbox {
                    writer.write(&block);
                    // Release the block before acking so `deliver` can reuse it
                    drop(block);
                    if acks.send(role).is_err() {
                        break;
                    }
                }
                tracing::debug!(%role, "fan-out lane finished");
            })
            .map_err(PipeError::WorkerSpawn)?;

        Ok(Self {
            role,
            blocks: Some(blocks),
            handle: Some(handle),
        })
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        // Closing the sender ends the lane loop
        self.blocks.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(role = %self.role, "fan-out lane panicked");
            }
        }
    }
}

/// Distributes captured blocks to both channel buffers.
pub struct FanOut {
    lanes: ChannelPair<Lane>,
    acks: Receiver<ChannelRole>,
    block: Arc<Vec<u8>>,
    counters: Arc<CaptureCounters>,
}

impl FanOut {
    /// Starts one lane thread per writer.
    ///
    /// # Errors
    ///
    /// Returns `WorkerSpawn` if a lane thread cannot be created. A lane
    /// that did start is shut down again before the error is returned.
    pub fn spawn(writers: ChannelPair<BufferWriter>) -> Result<Self, PipeError> {
        let (ack_tx, acks) = crossbeam_channel::bounded(2);
        let lanes = writers
            .map(|_, writer| Lane::spawn(writer, ack_tx.clone()))
            .transpose()?;

        Ok(Self {
            lanes,
            acks,
            block: Arc::new(Vec::new()),
            counters: Arc::new(CaptureCounters::default()),
        })
    }

    /// Returns the shared capture counters.
    pub fn counters(&self) -> Arc<CaptureCounters> {
        Arc::clone(&self.counters)
    }

    /// Hands `block` to both buffers and waits until both have taken it.
    pub fn deliver(&mut self, block: &[u8]) {
        match Arc::get_mut(&mut self.block) {
            Some(storage) => {
                storage.clear();
                storage.extend_from_slice(block);
            }
            // A lane still holds the last block; only after a lane failure
            None => self.block = Arc::new(block.to_vec()),
        }

        let mut pending = 0;
        for lane in &self.lanes {
            let sent = lane
                .blocks
                .as_ref()
                .is_some_and(|tx| tx.send(Arc::clone(&self.block)).is_ok());
            if sent {
                pending += 1;
            } else {
                tracing::warn!(role = %lane.role, "fan-out lane is gone, block not buffered");
            }
        }

        for _ in 0..pending {
            if self.acks.recv().is_err() {
                break;
            }
        }

        self.counters.record(block.len());
    }
}
