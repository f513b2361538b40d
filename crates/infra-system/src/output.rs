// Child stdout handle that only the supervisor can close
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader, ReadBuf};
use tokio::process::ChildStdout;

/// Buffered child stdout
///
/// Readers only borrow it through the shared lock. Once the supervisor calls
/// [`ChildOutput::close`] the pipe is dropped and every later read sees
/// end-of-stream, no matter how many clones of the handle are still alive.
pub struct ChildOutput {
    inner: Option<BufReader<ChildStdout>>,
}

impl ChildOutput {
    pub(crate) fn new(stdout: ChildStdout) -> Self {
        Self {
            inner: Some(BufReader::new(stdout)),
        }
    }

    /// Drop the pipe; returns false if it was already closed
    pub(crate) fn close(&mut self) -> bool {
        self.inner.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl AsyncRead for ChildOutput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().inner.as_mut() {
            Some(reader) => Pin::new(reader).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncBufRead for ChildOutput {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        match self.get_mut().inner.as_mut() {
            Some(reader) => Pin::new(reader).poll_fill_buf(cx),
            None => Poll::Ready(Ok(&[])),
        }
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        if let Some(reader) = self.get_mut().inner.as_mut() {
            Pin::new(reader).consume(amt);
        }
    }
}
