// Line Reader: drains a child's stdout on its own task and hands decoded
// structured messages to a sink, in stream order.
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use pipewarden_core::application::ShutdownToken;
use pipewarden_core::domain::{CapturePolicy, OutputLine, ReadOutcome, ReadSummary, ReaderEnd};
use pipewarden_core::port::time_provider::SystemTimeProvider;
use pipewarden_core::port::{LineSink, TimeProvider};

/// Longest line returned in one piece
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Read one LF-terminated line
///
/// An unterminated tail before EOF is returned as a line. Invalid UTF-8 is
/// replaced rather than treated as a read error. A line longer than
/// [`MAX_LINE_BYTES`] comes back in pieces, none of which decode as a
/// message, so the reader discards it without unbounded buffering.
pub async fn read_next<R>(source: &mut R, buf: &mut Vec<u8>) -> ReadOutcome
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    read_bounded(source, buf, MAX_LINE_BYTES).await
}

async fn read_bounded<R>(source: &mut R, buf: &mut Vec<u8>, limit: usize) -> ReadOutcome
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    buf.clear();
    let mut bounded = (&mut *source).take(limit.max(1) as u64);
    match bounded.read_until(b'\n', buf).await {
        Ok(0) => ReadOutcome::EndOfStream,
        Ok(_) => ReadOutcome::Line(String::from_utf8_lossy(buf).into_owned()),
        Err(e) => ReadOutcome::ReadError(e.to_string()),
    }
}

/// Spawns reader tasks with a fixed capture policy
pub struct LineReader {
    policy: CapturePolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl LineReader {
    pub fn new(policy: CapturePolicy) -> Self {
        Self::with_time_provider(policy, Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(policy: CapturePolicy, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            policy,
            time_provider,
        }
    }

    pub fn policy(&self) -> CapturePolicy {
        self.policy
    }

    /// Start draining `source` on a new task
    ///
    /// The task holds the source lock for its whole run and never closes the
    /// underlying stream; it ends on end-of-stream, a read error, a
    /// satisfied single-shot capture, or cancellation through `token`.
    pub fn spawn<R, S>(&self, source: Arc<Mutex<R>>, sink: S, token: ShutdownToken) -> ReaderHandle
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        S: LineSink + 'static,
    {
        let (first_tx, first_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = watch::channel(0usize);
        let drain = Drain {
            policy: self.policy,
            time_provider: self.time_provider.clone(),
            sink,
            token,
            first: Some(first_tx),
            progress: progress_tx,
        };

        let task = tokio::spawn(async move {
            let mut guard = source.lock().await;
            drain.run(&mut *guard).await
        });

        ReaderHandle {
            first: Some(first_rx),
            progress: progress_rx,
            task,
        }
    }
}

struct Drain<S> {
    policy: CapturePolicy,
    time_provider: Arc<dyn TimeProvider>,
    sink: S,
    token: ShutdownToken,
    first: Option<oneshot::Sender<OutputLine>>,
    progress: watch::Sender<usize>,
}

impl<S: LineSink> Drain<S> {
    async fn run<R>(mut self, source: &mut R) -> ReadSummary
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let mut summary = ReadSummary::new();
        let mut buf = Vec::new();

        loop {
            // Checked every line: a pipe that never runs dry must not
            // starve cancellation
            if self.token.is_shutdown() {
                summary.end = ReaderEnd::Cancelled;
                break;
            }

            // A line already being read finishes before a pending shutdown
            let outcome = tokio::select! {
                biased;
                outcome = read_next(source, &mut buf) => outcome,
                _ = self.token.wait() => {
                    summary.end = ReaderEnd::Cancelled;
                    break;
                }
            };

            let raw = match outcome {
                ReadOutcome::Line(raw) => raw,
                ReadOutcome::EndOfStream => {
                    summary.end = ReaderEnd::EndOfStream;
                    break;
                }
                ReadOutcome::ReadError(e) => {
                    debug!(error = %e, "Stdout read failed, reader stopping");
                    summary.end = ReaderEnd::ReadError(e);
                    break;
                }
            };

            let line = OutputLine::decode(raw, self.time_provider.now_millis());
            if line.is_blank() {
                continue;
            }
            summary.lines_read += 1;

            if !line.is_structured() {
                trace!(line = %line.raw, "Discarding non-protocol output");
                summary.discarded += 1;
                continue;
            }

            debug!(kind = ?line.kind(), bytes = line.raw.len(), "Structured message received");
            self.sink.deliver(&line);
            summary.delivered += 1;
            if let Some(first) = self.first.take() {
                let _ = first.send(line);
            }
            self.progress.send_replace(summary.delivered);

            if self.policy == CapturePolicy::SingleShot {
                summary.end = ReaderEnd::Captured;
                break;
            }
        }

        debug!(
            lines_read = summary.lines_read,
            delivered = summary.delivered,
            discarded = summary.discarded,
            end = ?summary.end,
            "Reader finished"
        );
        summary
    }
}

/// Caller-side view of a running reader
pub struct ReaderHandle {
    first: Option<oneshot::Receiver<OutputLine>>,
    progress: watch::Receiver<usize>,
    task: JoinHandle<ReadSummary>,
}

impl ReaderHandle {
    /// Wait for the first decoded message, bounded by `timeout`
    ///
    /// Resolves once; later calls return `None`. Also `None` when the reader
    /// ended without decoding anything.
    pub async fn first_message(&mut self, timeout: Duration) -> Option<OutputLine> {
        let rx = self.first.take()?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(line)) => Some(line),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(timeout_ms = %timeout.as_millis(), "No structured message before timeout");
                None
            }
        }
    }

    /// Count of messages delivered so far; closes when the reader ends
    pub fn progress(&self) -> watch::Receiver<usize> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the reader task and return its summary
    pub async fn join(self) -> ReadSummary {
        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Reader task failed");
                ReadSummary {
                    end: ReaderEnd::ReadError(format!("reader task failed: {}", e)),
                    ..ReadSummary::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewarden_core::application::shutdown_channel;
    use pipewarden_core::port::line_sink::mocks::CollectingSink;
    use pipewarden_core::port::time_provider::FixedTimeProvider;
    use serde_json::json;
    use std::io;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    fn shared<R>(reader: R) -> Arc<Mutex<BufReader<R>>>
    where
        R: tokio::io::AsyncRead,
    {
        Arc::new(Mutex::new(BufReader::new(reader)))
    }

    #[tokio::test]
    async fn test_read_next_outcomes() {
        let mut source: &[u8] = b"first\nsecond";
        let mut buf = Vec::new();

        assert_eq!(
            read_next(&mut source, &mut buf).await,
            ReadOutcome::Line("first\n".to_string())
        );
        assert_eq!(
            read_next(&mut source, &mut buf).await,
            ReadOutcome::Line("second".to_string())
        );
        assert_eq!(read_next(&mut source, &mut buf).await, ReadOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn test_overlong_line_is_split_at_limit() {
        let mut source: &[u8] = b"abcdefghij\n{}\n";
        let mut buf = Vec::new();

        assert_eq!(
            read_bounded(&mut source, &mut buf, 4).await,
            ReadOutcome::Line("abcd".to_string())
        );
        assert_eq!(buf.len(), 4);
        assert_eq!(
            read_bounded(&mut source, &mut buf, 4).await,
            ReadOutcome::Line("efgh".to_string())
        );
        assert_eq!(
            read_bounded(&mut source, &mut buf, 4).await,
            ReadOutcome::Line("ij\n".to_string())
        );
        assert_eq!(
            read_bounded(&mut source, &mut buf, 4).await,
            ReadOutcome::Line("{}\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_read_next_reports_errors() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "reset"))
            .build();
        let mut source = BufReader::new(mock);
        let mut buf = Vec::new();

        match read_next(&mut source, &mut buf).await {
            ReadOutcome::ReadError(msg) => assert!(msg.contains("reset")),
            other => panic!("expected read error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_shot_skips_noise_and_stops() {
        let source: &'static [u8] =
            b"not-json\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n{\"id\":2,\"result\":{}}\n";
        let sink = CollectingSink::new();
        let (_tx, token) = shutdown_channel();
        let reader = LineReader::with_time_provider(
            CapturePolicy::SingleShot,
            Arc::new(FixedTimeProvider(1_000)),
        );

        let mut handle = reader.spawn(shared(source), sink.clone(), token);
        let first = handle.first_message(Duration::from_secs(1)).await.unwrap();
        let summary = handle.join().await;

        assert_eq!(first.payload, Some(json!({"jsonrpc": "2.0", "id": 1, "result": {}})));
        assert_eq!(first.received_at_ms, 1_000);
        assert_eq!(sink.payloads().len(), 1);
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.end, ReaderEnd::Captured);
    }

    #[tokio::test]
    async fn test_continuous_preserves_order_across_chunks() {
        // Lines split across reads, with blank and diagnostic lines mixed in
        let mock = Builder::new()
            .read(b"{\"seq\":1}\n\nlog: warming up\n{\"se")
            .read(b"q\":2}\n")
            .read(b"{\"seq\":3}")
            .build();
        let sink = CollectingSink::new();
        let (_tx, token) = shutdown_channel();

        let handle = LineReader::new(CapturePolicy::Continuous).spawn(
            shared(mock),
            sink.clone(),
            token,
        );
        let summary = handle.join().await;

        assert_eq!(
            sink.payloads(),
            vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})]
        );
        assert_eq!(summary.lines_read, 4);
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.end, ReaderEnd::EndOfStream);
    }

    #[tokio::test]
    async fn test_read_error_ends_reader_quietly() {
        let mock = Builder::new()
            .read(b"{\"id\":1,\"result\":true}\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "stream reset"))
            .build();
        let sink = CollectingSink::new();
        let (_tx, token) = shutdown_channel();

        let handle = LineReader::new(CapturePolicy::Continuous).spawn(
            shared(mock),
            sink.clone(),
            token,
        );
        let summary = handle.join().await;

        assert_eq!(summary.delivered, 1);
        assert!(matches!(summary.end, ReaderEnd::ReadError(ref msg) if msg.contains("stream reset")));
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_idle_reader() {
        // Writer half kept open: the reader would block forever without a token
        let (_writer, reader_half) = tokio::io::duplex(64);
        let (tx, token) = shutdown_channel();
        let sink = |_line: &OutputLine| {};

        let handle = LineReader::new(CapturePolicy::Continuous).spawn(
            shared(reader_half),
            sink,
            token,
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        tx.shutdown();
        let summary = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("cancelled reader should finish");

        assert_eq!(summary.end, ReaderEnd::Cancelled);
        assert_eq!(summary.lines_read, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reader_with_endless_input() {
        // Every read is immediately ready, so only the per-line check can
        // observe the shutdown
        let input = b"{\"tick\":1}\n".repeat(50_000);
        let (tx, token) = shutdown_channel();
        let mut delivered = 0usize;
        let sink = move |_: &OutputLine| {
            delivered += 1;
            if delivered == 3 {
                tx.shutdown();
            }
        };

        let handle = LineReader::new(CapturePolicy::Continuous).spawn(
            shared(std::io::Cursor::new(input)),
            sink,
            token,
        );
        let summary = handle.join().await;

        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.end, ReaderEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_progress_counts_deliveries() {
        let source: &'static [u8] = b"{\"a\":1}\nnoise\n{\"b\":2}\n";
        let (_tx, token) = shutdown_channel();

        let handle = LineReader::new(CapturePolicy::Continuous).spawn(
            shared(source),
            CollectingSink::new(),
            token,
        );
        let mut progress = handle.progress();
        progress.wait_for(|n| *n >= 2).await.ok();
        let summary = handle.join().await;

        assert_eq!(*progress.borrow(), 2);
        assert_eq!(summary.delivered, 2);
    }

    #[tokio::test]
    async fn test_first_message_none_when_nothing_decodes() {
        let source: &'static [u8] = b"plain text\nmore text\n";
        let (_tx, token) = shutdown_channel();

        let mut handle = LineReader::new(CapturePolicy::SingleShot).spawn(
            shared(source),
            CollectingSink::new(),
            token,
        );

        assert!(handle.first_message(Duration::from_secs(1)).await.is_none());
        let summary = handle.join().await;
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.end, ReaderEnd::EndOfStream);
    }
}
