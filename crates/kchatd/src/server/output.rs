//! Line-framed output sink shared between a session and broadcasters.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};

use kchat_protocol::ServerMessage;

use super::connection::ConnectionError;

/// Type-erased write half of a client connection
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Newline-framed sink over the write half
type LineSink = FramedWrite<BoxedWriter, LinesCodec>;

/// Output endpoint of a session.
///
/// Cloning yields another handle to the same sink. The sink sits behind a
/// mutex, so concurrent writers never interleave within a line. The write
/// timeout covers waiting for the mutex as well as the write itself, so a
/// stalled peer costs each writer at most one timeout.
#[derive(Clone)]
pub struct SessionOutput {
    sink: Arc<Mutex<LineSink>>,
    write_timeout: Duration,
}

impl SessionOutput {
    /// Wraps the write half of a connection.
    pub fn new<W>(writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, LinesCodec::new()))),
            write_timeout,
        }
    }

    /// Sends a protocol message as one line.
    pub async fn send(&self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        self.send_line(&msg.to_string()).await
    }

    /// Sends a pre-rendered line and flushes it.
    pub async fn send_line(&self, line: &str) -> Result<(), ConnectionError> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(line).await
        };

        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(codec_error(e)),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Flushes and shuts down the write half.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let shutdown = async {
            let mut sink = self.sink.lock().await;
            SinkExt::<&str>::close(&mut *sink).await
        };

        match timeout(self.write_timeout, shutdown).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(codec_error(e)),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

impl fmt::Debug for SessionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOutput")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

fn codec_error(err: LinesCodecError) -> ConnectionError {
    match err {
        LinesCodecError::Io(e) => ConnectionError::Io(e.to_string()),
        other @ LinesCodecError::MaxLineLengthExceeded => ConnectionError::Io(other.to_string()),
    }
}
