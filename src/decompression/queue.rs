use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::gpu::{BufferHandle, TextureHandle};

#[derive(Debug, Clone)]
pub enum QueueDestination {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
    },
    /// A whole texture subresource, addressed by its subresource index.
    Texture {
        texture: TextureHandle,
        subresource: u32,
        width: u32,
        height: u32,
    },
}

/// One GDeflate stream in host memory, decompressed by the queue into a GPU resource.
#[derive(Debug, Clone)]
pub struct DecompressionRequest {
    pub source: Vec<u8>,
    pub destination: QueueDestination,
    pub uncompressed_size: u64,
}

/// A dedicated decompression queue. Requests are only processed after [`DecompressionQueue::submit`].
pub trait DecompressionQueue {
    fn enqueue_request(&mut self, request: DecompressionRequest);

    /// The event is signalled once every request enqueued before it has completed.
    fn enqueue_signal(&mut self, event: Arc<CompletionEvent>);

    fn submit(&mut self);

    /// Requests that failed to decompress since the queue was created. Failures are not attributed to
    /// individual requests.
    fn failures(&self) -> usize;
}

/// A manual reset event.
#[derive(Debug, Default)]
pub struct CompletionEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionEvent {
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.condvar.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the event is signalled; there is no timeout.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            signaled = self.condvar.wait(signaled).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn reset(&self) {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}
