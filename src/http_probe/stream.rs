use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::phase::ConnectionPhase;
use super::trace::Tracer;

/// Byte stream wrapper that fires the request-write and response-read hooks.
///
/// It sits on top of the plaintext stream hyper talks HTTP over (above TLS,
/// when there is TLS), so what it observes is the request itself:
/// - first bytes accepted by the transport: `WroteHeaderField`, `WroteHeaders`
/// - first successful flush after that: `WroteRequest`
/// - first read that yields data: `GotFirstResponseByte`
pub struct TracedStream<S> {
    inner: S,
    tracer: Tracer,
    header_fields: String,
    wrote_head: bool,
    flushed_request: bool,
    read_first_byte: bool,
}

impl<S> TracedStream<S> {
    /// `header_fields` names the request header fields, for the
    /// `WroteHeaderField` event detail.
    pub fn new(inner: S, tracer: Tracer, header_fields: String) -> Self {
        Self {
            inner,
            tracer,
            header_fields,
            wrote_head: false,
            flushed_request: false,
            read_first_byte: false,
        }
    }

    fn on_written(&mut self, written: usize) {
        if written == 0 || self.wrote_head {
            return;
        }
        self.wrote_head = true;
        let fields = &self.header_fields;
        self.tracer
            .record_with(ConnectionPhase::WroteHeaderField, || fields.as_str());
        self.tracer.record(ConnectionPhase::WroteHeaders);
    }

    fn on_flushed(&mut self) {
        if self.wrote_head && !self.flushed_request {
            self.flushed_request = true;
            self.tracer.record(ConnectionPhase::WroteRequest);
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if !this.read_first_byte && buf.filled().len() > before {
                this.read_first_byte = true;
                this.tracer.record(ConnectionPhase::GotFirstResponseByte);
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = poll {
            this.on_written(written);
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(written)) = poll {
            this.on_written(written);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        if let Poll::Ready(Ok(())) = poll {
            this.on_flushed();
        }
        poll
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
