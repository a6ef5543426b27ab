//! Sharded async ingestion pipeline.
//!
//! Frames are routed by a hash of their source identifier to one of
//! `shards` worker tasks, each owning an `Ingestor`. A source is therefore
//! always handled by a single worker and its frames are applied in
//! submission order, while different sources decode in parallel.
//!
//! Snapshot updates and diagnostics are published on two bounded
//! `broadcast` channels. Every consumer has its own queue; a slow consumer
//! lags and is told how many events it missed, decoding never waits for it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use odid_core::{Diagnostic, IngestEvent, Ingestor, RawFrame, SnapshotUpdate};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ReceiverError, Result};

/// Final counters returned by `Pipeline::shutdown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub snapshots: u64,
    pub diagnostics: u64,
    pub sources: usize,
}

impl std::ops::AddAssign for PipelineStats {
    fn add_assign(&mut self, other: Self) {
        self.frames += other.frames;
        self.snapshots += other.snapshots;
        self.diagnostics += other.diagnostics;
        self.sources += other.sources;
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Consumer of pipeline output, driven by its own task.
pub trait Observer: Send + 'static {
    fn on_snapshot(&mut self, update: &SnapshotUpdate);

    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}

    /// Called when this observer fell behind and `missed` events were dropped.
    fn on_lagged(&mut self, missed: u64) {
        warn!(missed, "Observer lagged, events dropped");
    }
}

impl<F> Observer for F
where
    F: FnMut(&SnapshotUpdate) + Send + 'static,
{
    fn on_snapshot(&mut self, update: &SnapshotUpdate) {
        self(update)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    shards: Vec<mpsc::Sender<RawFrame>>,
    workers: Vec<JoinHandle<PipelineStats>>,
    snapshots: broadcast::Sender<SnapshotUpdate>,
    diagnostics: broadcast::Sender<Diagnostic>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Start the shard workers. Must be called inside a Tokio runtime.
    pub fn spawn(config: &PipelineConfig) -> Self {
        let shard_count = config.shards.max(1);
        let (snapshots, _) = broadcast::channel(config.event_queue.max(1));
        let (diagnostics, _) = broadcast::channel(config.event_queue.max(1));
        let cancel = CancellationToken::new();

        let mut shards = Vec::with_capacity(shard_count);
        let mut workers = Vec::with_capacity(shard_count);
        for shard in 0..shard_count {
            let (tx, rx) = mpsc::channel(config.frame_queue.max(1));
            let ingestor = Ingestor::new(config.framing, config.stale_timeout);
            workers.push(tokio::spawn(shard_worker(
                shard,
                rx,
                ingestor,
                snapshots.clone(),
                diagnostics.clone(),
                cancel.clone(),
            )));
            shards.push(tx);
        }

        info!(
            shards = shard_count,
            framing = ?config.framing,
            "Pipeline started"
        );
        Pipeline {
            shards,
            workers,
            snapshots,
            diagnostics,
            cancel,
        }
    }

    /// Index of the shard that owns `source`.
    pub fn shard_for(&self, source: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Queue a frame for decoding. Waits while the owning shard's queue is full.
    pub async fn submit(&self, frame: RawFrame) -> Result<()> {
        let shard = self.shard_for(&frame.source);
        self.shards[shard]
            .send(frame)
            .await
            .map_err(|_| ReceiverError::PipelineClosed)
    }

    /// New receiver for snapshot updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.snapshots.subscribe()
    }

    /// New receiver for decode diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    /// Spawn a task feeding both channels to `observer`.
    ///
    /// The task ends when the pipeline has shut down and both channels are
    /// drained, or on cancellation, and hands the observer back.
    pub fn register_observer<O: Observer>(&self, mut observer: O) -> JoinHandle<O> {
        let mut snapshots = self.subscribe();
        let mut diagnostics = self.diagnostics();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut snapshots_open = true;
            let mut diagnostics_open = true;
            while snapshots_open || diagnostics_open {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = snapshots.recv(), if snapshots_open => match update {
                        Ok(update) => observer.on_snapshot(&update),
                        Err(RecvError::Lagged(missed)) => observer.on_lagged(missed),
                        Err(RecvError::Closed) => snapshots_open = false,
                    },
                    diagnostic = diagnostics.recv(), if diagnostics_open => match diagnostic {
                        Ok(diagnostic) => observer.on_diagnostic(&diagnostic),
                        Err(RecvError::Lagged(missed)) => observer.on_lagged(missed),
                        Err(RecvError::Closed) => diagnostics_open = false,
                    },
                }
            }
            observer
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all workers immediately, dropping queued frames.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close input, let every shard drain its queue, and return the totals.
    pub async fn shutdown(self) -> Result<PipelineStats> {
        let Pipeline {
            shards, workers, ..
        } = self;
        drop(shards);

        let mut stats = PipelineStats::default();
        for worker in workers {
            stats += worker.await?;
        }
        info!(
            frames = stats.frames,
            snapshots = stats.snapshots,
            diagnostics = stats.diagnostics,
            sources = stats.sources,
            "Pipeline stopped"
        );
        Ok(stats)
    }
}

async fn shard_worker(
    shard: usize,
    mut rx: mpsc::Receiver<RawFrame>,
    mut ingestor: Ingestor,
    snapshots: broadcast::Sender<SnapshotUpdate>,
    diagnostics: broadcast::Sender<Diagnostic>,
    cancel: CancellationToken,
) -> PipelineStats {
    debug!(shard, "Shard worker started");
    let mut last_prune: Option<f64> = None;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(shard, "Shard worker cancelled");
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        for event in ingestor.process(&frame) {
            // send only fails when nobody is subscribed
            match event {
                IngestEvent::Snapshot(update) => {
                    let _ = snapshots.send(update);
                }
                IngestEvent::Diagnostic(diagnostic) => {
                    let _ = diagnostics.send(diagnostic);
                }
            }
        }

        if let Some(now) = frame.timestamp {
            let since = now - *last_prune.get_or_insert(now);
            if since >= ingestor.stale_timeout {
                let removed = ingestor.prune_stale(now);
                if removed > 0 {
                    debug!(shard, removed, "Pruned stale sources");
                }
                last_prune = Some(now);
            }
        }
    }

    debug!(shard, frames = ingestor.total_frames, "Shard worker ended");
    PipelineStats {
        frames: ingestor.total_frames,
        snapshots: ingestor.snapshots_emitted,
        diagnostics: ingestor.diagnostics_emitted,
        sources: ingestor.source_count(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use odid_core::encode::encode_message;
    use odid_core::{
        DecodeErrorKind, DescriptionType, Framing, Message, OperatorIdRecord, OperatorIdType,
        SelfIdRecord,
    };

    use super::*;
    use crate::capture::feed;

    fn config(shards: usize, event_queue: usize) -> PipelineConfig {
        PipelineConfig {
            shards,
            frame_queue: 16,
            event_queue,
            framing: Framing::Bare,
            stale_timeout: 300.0,
        }
    }

    fn self_id_frame(source: &str, text: &str) -> RawFrame {
        let message = Message::SelfId(SelfIdRecord {
            description_type: DescriptionType::Text,
            description: text.to_string(),
        });
        RawFrame::new(source, encode_message(&message).to_vec()).with_timestamp(1.0)
    }

    fn operator_frame(source: &str, id: &str) -> RawFrame {
        let message = Message::OperatorId(OperatorIdRecord {
            operator_id_type: OperatorIdType::Caa,
            operator_id: id.to_string(),
        });
        RawFrame::new(source, encode_message(&message).to_vec()).with_timestamp(1.0)
    }

    #[derive(Default)]
    struct Collect {
        updates: Vec<SnapshotUpdate>,
        diagnostics: Vec<Diagnostic>,
        missed: u64,
    }

    impl Observer for Collect {
        fn on_snapshot(&mut self, update: &SnapshotUpdate) {
            self.updates.push(update.clone());
        }

        fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
            self.diagnostics.push(diagnostic.clone());
        }

        fn on_lagged(&mut self, missed: u64) {
            self.missed += missed;
        }
    }

    #[tokio::test]
    async fn test_snapshots_and_diagnostics_reach_observer() {
        let pipeline = Pipeline::spawn(&config(2, 64));
        let observer = pipeline.register_observer(Collect::default());

        pipeline.submit(self_id_frame("a", "hello")).await.unwrap();
        pipeline
            .submit(RawFrame::new("a", vec![0x72; 25]))
            .await
            .unwrap();
        let stats = pipeline.shutdown().await.unwrap();
        let observer = observer.await.unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.snapshots, 1);
        assert_eq!(stats.diagnostics, 1);
        assert_eq!(stats.sources, 1);
        assert_eq!(observer.updates.len(), 1);
        assert_eq!(
            observer.updates[0].snapshot.self_id.as_ref().unwrap().description,
            "hello"
        );
        assert_eq!(
            observer.diagnostics[0].error.kind(),
            DecodeErrorKind::UnknownMessageType
        );
        assert_eq!(observer.missed, 0);
    }

    #[tokio::test]
    async fn test_per_source_order_and_isolation() {
        let pipeline = Pipeline::spawn(&config(4, 1024));
        let observer = pipeline.register_observer(Collect::default());

        for i in 0..50 {
            for source in ["a", "b", "c"] {
                pipeline
                    .submit(self_id_frame(source, &format!("{source}-{i}")))
                    .await
                    .unwrap();
            }
        }
        pipeline.submit(operator_frame("b", "OP-B")).await.unwrap();
        let stats = pipeline.shutdown().await.unwrap();
        let observer = observer.await.unwrap();

        assert_eq!(stats.sources, 3);
        assert_eq!(stats.snapshots, 151);
        for source in ["a", "b", "c"] {
            let texts: Vec<String> = observer
                .updates
                .iter()
                .filter(|u| u.source == source)
                .filter_map(|u| u.snapshot.self_id.as_ref())
                .map(|s| s.description.clone())
                .collect();
            let expected: Vec<String> = (0..50).map(|i| format!("{source}-{i}")).collect();
            assert_eq!(&texts[..50], &expected[..]);
        }
        assert!(observer
            .updates
            .iter()
            .filter(|u| u.source != "b")
            .all(|u| u.snapshot.operator_id.is_none()));
    }

    #[tokio::test]
    async fn test_slow_consumer_lags() {
        let pipeline = Pipeline::spawn(&config(1, 2));
        let mut rx = pipeline.subscribe();

        for i in 0..6 {
            pipeline
                .submit(self_id_frame("a", &i.to_string()))
                .await
                .unwrap();
        }
        pipeline.shutdown().await.unwrap();

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(4))));
        assert_eq!(
            rx.recv().await.unwrap().snapshot.self_id.unwrap().description,
            "4"
        );
        assert_eq!(
            rx.recv().await.unwrap().snapshot.self_id.unwrap().description,
            "5"
        );
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_closure_observer() {
        let pipeline = Pipeline::spawn(&config(2, 64));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = pipeline.register_observer(move |u: &SnapshotUpdate| {
            sink.lock().unwrap().push(u.source.clone());
        });

        pipeline.submit(operator_frame("x", "OP")).await.unwrap();
        pipeline.shutdown().await.unwrap();
        handle.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_stops_workers() {
        let pipeline = Pipeline::spawn(&config(2, 64));
        let observer = pipeline.register_observer(Collect::default());
        pipeline.cancel();
        observer.await.unwrap();
        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.frames, 0);
    }

    #[tokio::test]
    async fn test_shard_routing_is_stable() {
        let pipeline = Pipeline::spawn(&config(8, 16));
        let shard = pipeline.shard_for("aa:bb:cc:dd:ee:ff");
        assert!(shard < 8);
        assert_eq!(pipeline.shard_for("aa:bb:cc:dd:ee:ff"), shard);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_feed_capture_lines() {
        let pipeline = Pipeline::spawn(&config(2, 64));
        let observer = pipeline.register_observer(Collect::default());
        let cancel = CancellationToken::new();

        let payload = odid_core::hex_encode(&encode_message(&Message::OperatorId(
            OperatorIdRecord {
                operator_id_type: OperatorIdType::Caa,
                operator_id: "OP".to_string(),
            },
        )));
        let text = format!("# capture\n\n1.0 src -50 {payload}\nsrc -50 ZZ\n*{payload};\n");
        let stats = feed(text.as_bytes(), &pipeline, &cancel).await.unwrap();
        assert_eq!(stats.lines, 5);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.rejected, 1);

        pipeline.shutdown().await.unwrap();
        let observer = observer.await.unwrap();
        let sources: Vec<&str> = observer.updates.iter().map(|u| u.source.as_str()).collect();
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&"src"));
        assert!(sources.contains(&"unknown"));
    }

    #[tokio::test]
    async fn test_untimed_capture_lines_do_not_prune_recorded_sources() {
        let pipeline = Pipeline::spawn(&PipelineConfig {
            stale_timeout: 10.0,
            ..config(1, 64)
        });
        let cancel = CancellationToken::new();

        let payload = odid_core::hex_encode(&encode_message(&Message::OperatorId(
            OperatorIdRecord {
                operator_id_type: OperatorIdType::Caa,
                operator_id: "OP".to_string(),
            },
        )));
        let text = format!("100.0 recorded -50 {payload}
live {payload}
");
        let stats = feed(text.as_bytes(), &pipeline, &cancel).await.unwrap();
        assert_eq!(stats.frames, 2);

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.sources, 2);
    }
}
