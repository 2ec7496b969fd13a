use std::sync::Arc;
use std::thread::JoinHandle;

use dagal::device::Device;
use tracing::{debug, error, info, trace};

use crate::copy_engine::CopyEngine;
use crate::error::{Result, StreamingError};
use crate::request::{QueuedRequest, RequestQueue};
use crate::stats::StreamingStats;
use crate::token::{SyncToken, TokenTracker};
use crate::upload::{self, UploadResult};

/// Fails every outstanding token if the worker unwinds
struct PanicGuard<D: Device> {
    tokens: Arc<TokenTracker>,
    queue: Arc<RequestQueue<D>>,
}

impl<D: Device> Drop for PanicGuard<D> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Streaming worker panicked");
            self.tokens.fail("streaming worker panicked");
            self.queue.shutdown();
        }
    }
}

/// The single thread that records and submits transfer work
pub(crate) struct Streamer<D: Device> {
    queue: Arc<RequestQueue<D>>,
    tokens: Arc<TokenTracker>,
    stats: Arc<StreamingStats>,
    engine: CopyEngine<D>,
    /// Highest token executed so far, across cycles
    max_token: SyncToken,
}

impl<D: Device> Streamer<D> {
    pub fn new(
        queue: Arc<RequestQueue<D>>,
        tokens: Arc<TokenTracker>,
        stats: Arc<StreamingStats>,
        engine: CopyEngine<D>,
    ) -> Self {
        Self {
            queue,
            tokens,
            stats,
            engine,
            max_token: 0,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("dare-streamer".to_string())
            .spawn(move || self.run())
            .map_err(|e| StreamingError::WorkerSpawn(e.to_string()))
    }

    fn run(mut self) {
        let _guard = PanicGuard {
            tokens: self.tokens.clone(),
            queue: self.queue.clone(),
        };
        info!("Streaming worker started");
        match self.run_inner() {
            Ok(()) => info!("Streaming worker stopped"),
            Err(e) => {
                error!("Streaming worker hit a fatal error: {e}");
                self.tokens.fail(e.to_string());
                self.queue.shutdown();
            }
        }
    }

    fn run_inner(&mut self) -> Result<()> {
        loop {
            let tokens = self.tokens.clone();
            let running = self.queue.wait_for_work(|| tokens.all_completed())?;
            self.cycle()?;
            if !running && self.queue.is_empty()? {
                break;
            }
        }
        self.engine.shutdown()?;
        self.tokens.publish(self.max_token)?;
        Ok(())
    }

    fn cycle(&mut self) -> Result<()> {
        let completed = self.engine.advance()?;
        self.tokens.publish(completed)?;

        let requests = self.queue.drain()?;
        if !requests.is_empty() {
            trace!("Executing {} requests", requests.len());
        }
        for QueuedRequest {
            request,
            wait_index,
        } in requests
        {
            match upload::execute(&mut self.engine, &self.stats, request)? {
                UploadResult::Completed => {}
                UploadResult::InvalidRequest => {
                    self.tokens.mark_invalid(wait_index)?;
                    StreamingStats::bump(&self.stats.invalid_requests);
                }
            }
            StreamingStats::bump(&self.stats.requests_executed);
            self.max_token = self.max_token.max(wait_index);
        }

        if self.engine.flush()? {
            debug!("Batch submitted up to token {}", self.max_token);
        }
        let high_water = self.max_token.max(self.tokens.last_completed());
        self.engine.set_high_water(high_water);
        Ok(())
    }
}
