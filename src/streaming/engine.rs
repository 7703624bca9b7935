//! Background chunk streaming.
//!
//! One worker thread per engine reads chunk payloads from the blob stream.
//! Requests go in over a blocking channel; finished requests come back over
//! a second channel and are handed to the caller from
//! [`StreamingEngine::process_pending_completions`] on the main thread.
//! The worker only ever sees byte buffers.

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::core::{Error, Result};
use crate::terrain::{BlobStream, TerrainData, TerrainDataProvider};
use super::request::{PayloadKinds, RequestPool, StreamingRequest};

type RequestBox<T> = Box<StreamingRequest<T>>;

/// Everything the worker needs, held until the first drain starts it
struct WorkerStartup<T> {
    stream: BlobStream,
    request_rx: Receiver<RequestBox<T>>,
    completion_tx: Sender<RequestBox<T>>,
}

/// Streams chunk payloads on a dedicated thread
pub struct StreamingEngine<T: Send + 'static> {
    name: String,
    terrain: Arc<TerrainData>,
    request_tx: Option<Sender<RequestBox<T>>>,
    completion_rx: Receiver<RequestBox<T>>,
    startup: Option<WorkerStartup<T>>,
    worker: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    pool: RequestPool<T>,
    in_flight: usize,
}

impl<T: Send + 'static> StreamingEngine<T> {
    /// Create an engine over an open blob stream. The worker starts on the
    /// first call to [`StreamingEngine::process_pending_completions`].
    pub fn new(name: &str, terrain: Arc<TerrainData>, stream: BlobStream, pool_capacity: usize) -> Self {
        let (request_tx, request_rx) = mpsc::channel();
        let (completion_tx, completion_rx) = mpsc::channel();
        let pool = RequestPool::new(terrain.header(), pool_capacity);

        Self {
            name: name.to_string(),
            terrain,
            request_tx: Some(request_tx),
            completion_rx,
            startup: Some(WorkerStartup {
                stream,
                request_rx,
                completion_tx,
            }),
            worker: None,
            cancel: Arc::new(AtomicBool::new(false)),
            pool,
            in_flight: 0,
        }
    }

    /// Create an engine with its own stream from `provider`
    pub fn from_provider(name: &str, provider: &dyn TerrainDataProvider, pool_capacity: usize) -> Result<Self> {
        let stream = provider.open_stream()?;
        Ok(Self::new(name, provider.terrain_data().clone(), stream, pool_capacity))
    }

    /// Queue a read of `kinds` for `chunk_index`. Never blocks.
    ///
    /// Returns `false` if the request was rejected (unknown chunk or engine
    /// disposed); no completion follows a rejected request. Requests are not
    /// deduplicated: every accepted call gets its own completion.
    pub fn request(&mut self, kinds: PayloadKinds, chunk_index: u32, token: T) -> bool {
        if self.terrain.chunk(chunk_index).is_none() {
            log::error!("[{}] request for unknown chunk {}", self.name, chunk_index);
            return false;
        }
        let Some(request_tx) = &self.request_tx else {
            log::warn!("[{}] request for chunk {} after dispose", self.name, chunk_index);
            return false;
        };

        let request = self.pool.acquire(kinds, chunk_index, token);
        match request_tx.send(request) {
            Ok(()) => {
                self.in_flight += 1;
                log::trace!("[{}] queued chunk {} ({:?})", self.name, chunk_index, kinds);
                true
            }
            Err(mpsc::SendError(request)) => {
                log::error!("[{}] streaming worker is gone, dropping chunk {}", self.name, chunk_index);
                self.pool.release(request);
                false
            }
        }
    }

    /// Hand up to `max_to_process` completions (all if 0) to `handler`.
    ///
    /// Must be called from the thread that owns the engine, once per frame.
    /// The completion's buffers are only borrowed for the duration of the
    /// handler call; the request object goes back to the pool afterwards.
    pub fn process_pending_completions<F>(&mut self, max_to_process: usize, mut handler: F) -> usize
    where
        F: FnMut(&StreamingRequest<T>, T),
    {
        self.ensure_started();

        let mut processed = 0;
        while max_to_process == 0 || processed < max_to_process {
            match self.completion_rx.try_recv() {
                Ok(mut request) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    if let Some(error) = request.error() {
                        log::warn!(
                            "[{}] read of chunk {} failed: {}",
                            self.name,
                            request.chunk_index(),
                            error
                        );
                    }
                    if let Some(token) = request.token.take() {
                        handler(&request, token);
                    }
                    self.pool.release(request);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.reap_worker();
                    break;
                }
            }
        }
        processed
    }

    /// Stop the worker and close the stream. Blocks until the thread has joined.
    pub fn dispose(&mut self) {
        self.cancel.store(true, Ordering::Release);
        // Closing the channel wakes a worker blocked on an empty queue
        self.request_tx = None;
        self.startup = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("[{}] streaming worker panicked", self.name);
            }
            log::debug!("[{}] streaming worker joined", self.name);
        }
        // Cancelled requests never complete; finished ones are discarded unseen
        while let Ok(request) = self.completion_rx.try_recv() {
            self.pool.release(request);
        }
        if self.in_flight > 0 {
            log::debug!("[{}] dropped {} in-flight requests on dispose", self.name, self.in_flight);
        }
        self.in_flight = 0;
    }

    /// Whether the worker thread has been started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Requests queued or being read, plus completions not yet processed
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Request objects currently allocated by the pool
    pub fn pooled_requests(&self) -> usize {
        self.pool.allocated()
    }

    pub fn terrain(&self) -> &Arc<TerrainData> {
        &self.terrain
    }

    /// Spawn the worker thread now instead of on the first drain.
    pub fn start(&mut self) -> Result<()> {
        let Some(startup) = self.startup.take() else {
            return Ok(());
        };

        let terrain = self.terrain.clone();
        let cancel = self.cancel.clone();
        let name = self.name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-streaming", self.name))
            .spawn(move || worker_loop(&name, &terrain, startup, &cancel))
            .map_err(|e| Error::Streaming(format!("failed to spawn {} worker: {}", self.name, e)))?;

        log::info!("[{}] streaming worker started", self.name);
        self.worker = Some(handle);
        Ok(())
    }

    fn ensure_started(&mut self) {
        if let Err(e) = self.start() {
            log::error!("[{}] {}", self.name, e);
        }
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("[{}] streaming worker panicked", self.name);
            } else {
                log::warn!("[{}] streaming worker exited", self.name);
            }
        }
    }
}

impl<T: Send + 'static> Drop for StreamingEngine<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn worker_loop<T>(name: &str, terrain: &TerrainData, startup: WorkerStartup<T>, cancel: &AtomicBool) {
    let WorkerStartup {
        mut stream,
        request_rx,
        completion_tx,
    } = startup;

    while let Ok(mut request) = request_rx.recv() {
        if cancel.load(Ordering::Acquire) {
            break;
        }
        read_request(terrain, &mut stream, &mut request);
        if completion_tx.send(request).is_err() {
            break;
        }
    }
    log::debug!("[{}] streaming worker stopping", name);
}

/// Fill the request's buffers. Stops at the first failing kind.
fn read_request<T>(terrain: &TerrainData, stream: &mut BlobStream, request: &mut StreamingRequest<T>) {
    let Some(record) = terrain.chunk(request.chunk_index) else {
        request.error = Some(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unknown chunk {}", request.chunk_index),
        ));
        return;
    };

    for kind in request.kinds.kinds() {
        let size = terrain.payload_size(kind) as usize;
        let position = stream.base_offset + record.offset(kind);
        let buffer = &mut request.buffers[kind.index()][..size];

        let result = stream
            .reader
            .seek(SeekFrom::Start(position))
            .and_then(|_| stream.reader.read_exact(buffer));
        match result {
            Ok(()) => request.filled |= PayloadKinds::from(kind),
            Err(e) => {
                request.error = Some(e);
                return;
            }
        }
    }
}
