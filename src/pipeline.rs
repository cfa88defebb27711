//! Frame loading: a synchronous-looking burst followed by an in-order stream.
//!
//! A single worker thread loads the first `burst_frames` frames and hands them
//! over as one batch, then keeps loading the rest one at a time into a bounded
//! queue. The first failure ends the stream for good and closes the queue.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::ascii_frame::AsciiFrame;
use crate::frame_store::FrameSource;
use crate::rasterizer::{rasterize, GridSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub burst_frames: usize,
    pub queue_capacity: usize,
    pub grid: GridSize,
}

/// Load and rasterize frame `number`.
pub fn load_ascii_frame(
    source: &dyn FrameSource,
    number: usize,
    grid: GridSize,
) -> Result<AsciiFrame> {
    let image = source
        .load_frame(number)
        .with_context(|| format!("failed loading frame {number}"))?;
    Ok(rasterize(number, &image, grid))
}

/// Load frames `1..=count` in order, stopping quietly at the first one that
/// is missing or undecodable.
pub fn load_burst(source: &dyn FrameSource, count: usize, grid: GridSize) -> Vec<AsciiFrame> {
    let mut frames = Vec::with_capacity(count);
    for number in 1..=count {
        match load_ascii_frame(source, number, grid) {
            Ok(frame) => frames.push(frame),
            Err(error) => {
                debug!(number, "burst load stopped early: {error:#}");
                break;
            }
        }
    }
    frames
}

#[derive(Debug)]
pub enum QueuePoll {
    Ready(AsciiFrame),
    Pending,
    Closed,
}

/// Consumer half of the bounded stream. FIFO, never reorders, and once closed
/// stays closed.
#[derive(Debug)]
pub struct FrameQueue {
    receiver: Receiver<AsciiFrame>,
    closed: bool,
}

impl FrameQueue {
    /// Bounded queue; `push` on the returned sender blocks while `capacity`
    /// frames are waiting.
    pub fn bounded(capacity: usize) -> (SyncSender<AsciiFrame>, Self) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        (
            sender,
            Self {
                receiver,
                closed: false,
            },
        )
    }

    pub fn try_pop(&mut self) -> QueuePoll {
        if self.closed {
            return QueuePoll::Closed;
        }
        match self.receiver.try_recv() {
            Ok(frame) => QueuePoll::Ready(frame),
            Err(TryRecvError::Empty) => QueuePoll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                QueuePoll::Closed
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Handle to a running loader.
pub struct FrameLoader {
    burst: Option<Receiver<Vec<AsciiFrame>>>,
    queue: FrameQueue,
}

impl FrameLoader {
    /// Start the worker. The burst and the stream are both requested now; the
    /// burst arrives through [`FrameLoader::try_take_burst`]. The thread is
    /// detached and exits once the queue's receiver is dropped.
    pub fn spawn(source: Arc<dyn FrameSource>, settings: LoaderSettings) -> Result<Self> {
        let (burst_tx, burst_rx) = mpsc::sync_channel::<Vec<AsciiFrame>>(1);
        let (frame_tx, queue) = FrameQueue::bounded(settings.queue_capacity);

        thread::Builder::new()
            .name("ascii-reel-frame-loader".to_owned())
            .spawn(move || run_loader(source.as_ref(), settings, burst_tx, frame_tx))
            .context("failed to spawn frame loader thread")?;

        Ok(Self {
            burst: Some(burst_rx),
            queue,
        })
    }

    /// Non-blocking. Yields the burst exactly once.
    pub fn try_take_burst(&mut self) -> Option<Vec<AsciiFrame>> {
        let receiver = self.burst.as_ref()?;
        let burst = match receiver.try_recv() {
            Ok(frames) => frames,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                warn!("frame loader exited before delivering its burst");
                Vec::new()
            }
        };
        self.burst = None;
        Some(burst)
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut FrameQueue {
        &mut self.queue
    }

}

fn run_loader(
    source: &dyn FrameSource,
    settings: LoaderSettings,
    burst_tx: SyncSender<Vec<AsciiFrame>>,
    frame_tx: SyncSender<AsciiFrame>,
) {
    let burst = load_burst(source, settings.burst_frames, settings.grid);
    let burst_len = burst.len();
    info!(frames = burst_len, "initial burst loaded");
    if burst_tx.send(burst).is_err() {
        return;
    }
    drop(burst_tx);

    // A short burst means the video ended or a frame failed; either way there
    // is nothing contiguous left to stream.
    if burst_len < settings.burst_frames {
        return;
    }

    stream_remaining(source, burst_len + 1, settings.grid, &frame_tx);
}

/// Push frames `first..=count` into the queue in order. Returns the number
/// of frames pushed. Dropping the sender afterwards closes the queue.
pub fn stream_remaining(
    source: &dyn FrameSource,
    first: usize,
    grid: GridSize,
    sender: &SyncSender<AsciiFrame>,
) -> usize {
    let total = match source.frame_count() {
        Ok(total) => total,
        Err(error) => {
            warn!("could not count frames, stream stopped: {error:#}");
            return 0;
        }
    };

    let mut pushed = 0;
    for number in first..=total {
        let frame = match load_ascii_frame(source, number, grid) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(number, "frame stream stopped: {error:#}");
                break;
            }
        };
        if sender.send(frame).is_err() {
            debug!(number, "frame queue consumer gone, stream stopped");
            break;
        }
        pushed += 1;
    }
    debug!(pushed, total, "frame stream finished");
    pushed
}
