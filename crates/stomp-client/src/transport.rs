use std::{collections::VecDeque, io, time::Duration};
use stomp_core::frame::{to_wire, NulFrameDecoder};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::watch,
};
use tracing::{debug, warn};

const READ_CHUNK_BYTES: usize = 4096;

pub struct FrameReader {
    inner: OwnedReadHalf,
    closed: watch::Receiver<bool>,
    decoder: NulFrameDecoder,
    ready: VecDeque<String>,
}

impl FrameReader {
    /// Next frame text without its terminator; `None` once the peer closed.
    /// Fails with `ConnectionAborted` once the paired writer closed the
    /// transport.
    pub async fn next_frame(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            let n = tokio::select! {
                _ = self.closed.wait_for(|closed| *closed) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "transport closed",
                    ));
                }
                read = self.inner.read(&mut chunk) => read?,
            };
            if n == 0 {
                return Ok(None);
            }
            let report = self.decoder.push_chunk(&chunk[..n]);
            for err in report.errors {
                warn!(event = "transport_frame_dropped", error = %err);
            }
            self.ready.extend(report.frames);
        }
    }
}

pub struct FrameWriter {
    inner: OwnedWriteHalf,
    closed: watch::Sender<bool>,
    max_frame_bytes: usize,
    write_timeout: Duration,
}

impl FrameWriter {
    /// Writes `text` followed by exactly one terminator byte.
    pub async fn send(&mut self, text: &str) -> io::Result<()> {
        let bytes = to_wire(text, self.max_frame_bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let write = async {
            self.inner.write_all(&bytes).await?;
            self.inner.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "frame write timed out",
            )),
        }
    }

    /// Shuts the connection down in both directions: the write half is
    /// closed and a read pending on the paired [`FrameReader`] fails.
    pub async fn close(&mut self) {
        if let Err(err) = self.inner.shutdown().await {
            debug!(event = "transport_shutdown_error", error = %err);
        }
        self.closed.send_replace(true);
    }
}

/// Splits a connected stream into a reader and writer that share one
/// close state.
pub fn split(
    stream: TcpStream,
    max_frame_bytes: usize,
    write_timeout: Duration,
) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = stream.into_split();
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        FrameReader {
            inner: read_half,
            closed: closed_rx,
            decoder: NulFrameDecoder::new(max_frame_bytes),
            ready: VecDeque::new(),
        },
        FrameWriter {
            inner: write_half,
            closed: closed_tx,
            max_frame_bytes,
            write_timeout,
        },
    )
}

pub async fn connect(
    addr: &str,
    max_frame_bytes: usize,
    write_timeout: Duration,
) -> io::Result<(FrameReader, FrameWriter)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream, max_frame_bytes, write_timeout))
}
