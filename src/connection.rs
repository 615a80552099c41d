use crate::error::TransportError;
use crate::protocol::Command;
use crate::types::UnitId;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, MutexGuard};

/// Byte channel to the amplifier
///
/// The channel is opened and configured (baud rate, device path) by the
/// application; this crate only writes commands and reads reply lines.
#[async_trait]
pub trait Channel: Send {
    /// Write all bytes and flush them to the device
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read one newline-terminated line, terminator included
    ///
    /// Waits until the device produces a full line. Returns
    /// [`TransportError::ConnectionClosed`] at end of stream.
    async fn read_line(&mut self) -> Result<String, TransportError>;

    /// Drop any input that has been received but not read yet, without
    /// waiting for more
    async fn discard_input(&mut self) -> Result<(), TransportError>;
}

/// [`Channel`] over any tokio byte stream, such as a serial port or a pipe
pub struct LineChannel<T> {
    stream: BufReader<T>,
}

impl<T> LineChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }
}

#[async_trait]
impl<T> Channel for LineChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Drops what is buffered plus everything the stream can deliver without
    /// waiting. Bytes still in flight on the wire are not waited for.
    async fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut discarded = 0;
        loop {
            let ready = match self.stream.fill_buf().now_or_never() {
                Some(buf) => buf?.len(),
                None => break,
            };
            if ready == 0 {
                break;
            }
            self.stream.consume(ready);
            discarded += ready;
        }
        if discarded > 0 {
            tracing::debug!("Discarded {} unread bytes", discarded);
        }

        self.stream.get_mut().flush().await?;
        Ok(())
    }
}

/// Shared access to one amplifier unit's channel
///
/// The generation counter is bumped on every reset so zone handles created
/// before it can tell they no longer describe the device.
pub(crate) struct Link {
    unit: UnitId,
    channel: Mutex<Box<dyn Channel>>,
    generation: AtomicU64,
}

impl Link {
    pub(crate) fn new(unit: UnitId, channel: Box<dyn Channel>) -> Self {
        Self {
            unit,
            channel: Mutex::new(channel),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn unit(&self) -> UnitId {
        self.unit
    }

    /// Take exclusive use of the channel until the returned guard is dropped
    pub(crate) async fn lock(&self) -> Exchange<'_> {
        Exchange {
            channel: self.channel.lock().await,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark every zone handle issued so far as stale
    pub(crate) fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Exclusive hold on the channel for one multi-step exchange
pub(crate) struct Exchange<'a> {
    channel: MutexGuard<'a, Box<dyn Channel>>,
}

impl Exchange<'_> {
    /// Write a command and check the device echoed it back unchanged
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<(), TransportError> {
        let sent = command.as_str();
        tracing::debug!("Sending: {:?}", sent);
        self.channel.send(command.as_bytes()).await?;

        let line = self.channel.read_line().await?;
        let echo = line.strip_suffix('\n').unwrap_or(&line);
        // The device echoes commands back commented out with '#'.
        let echo = echo.strip_prefix('#').unwrap_or(echo);

        if echo.len() != sent.len() {
            tracing::warn!("Echo length mismatch: read {:?}, wrote {:?}", echo, sent);
            return Err(TransportError::EchoLength {
                sent: sent.to_string(),
                received: echo.to_string(),
            });
        }
        if echo != sent {
            tracing::warn!("Echo mismatch: read {:?}, wrote {:?}", echo, sent);
            return Err(TransportError::EchoMismatch {
                sent: sent.to_string(),
                received: echo.to_string(),
            });
        }

        Ok(())
    }

    /// Read the next reply line without interpreting it
    pub(crate) async fn read_line(&mut self) -> Result<String, TransportError> {
        let line = self.channel.read_line().await?;
        tracing::debug!("Received: {:?}", line);
        Ok(line)
    }

    pub(crate) async fn discard_input(&mut self) -> Result<(), TransportError> {
        self.channel.discard_input().await
    }
}
