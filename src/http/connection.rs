use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{Instant, Sleep};

use crate::config::Config;
use crate::http::dispatch::{Dispatch, respond};
use crate::http::record::{ConnectionRecord, LineAction};
use crate::http::writer::ResponseWriter;
use crate::server::registry::Registration;

/// Drives one client connection.
///
/// Lines are fed to the [`ConnectionRecord`] in arrival order. The task ends
/// when the peer closes, when the idle sweep asks it to, after a response is
/// written, or on malformed input. Dropping the task drops the registration
/// and any pending delayed dispatch with it.
pub struct Connection<S> {
    stream: S,
    record: ConnectionRecord,
    registration: Registration,
    config: Arc<Config>,
}

enum Event {
    Closed,
    DelayElapsed,
    Line(Option<String>),
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, registration: Registration, config: Arc<Config>) -> Self {
        let record = ConnectionRecord::new(Arc::clone(registration.activity()), &config);
        Self {
            stream,
            record,
            registration,
            config,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        if !self.config.read {
            if self.record.disconnect_on_freeze {
                tracing::debug!("Not reading, disconnecting");
            } else {
                tracing::debug!("Not reading, hanging");
                tokio::select! {
                    _ = self.registration.closed() => tracing::debug!("Hang ended by idle sweep"),
                    _ = peer_closed(&mut self.stream) => tracing::debug!("Peer closed while hanging"),
                }
            }
            return Ok(());
        }

        let (reader, mut writer) = tokio::io::split(self.stream);
        let mut lines = BufReader::new(reader).lines();
        let mut pending: Option<Pin<Box<Sleep>>> = None;

        loop {
            let event = tokio::select! {
                _ = self.registration.closed() => Event::Closed,
                _ = delay_elapsed(&mut pending) => Event::DelayElapsed,
                line = lines.next_line() => Event::Line(line?),
            };

            match event {
                Event::Closed => {
                    tracing::debug!("Closed by idle sweep");
                    break;
                }
                Event::DelayElapsed => {
                    pending = None;
                    if Self::dispatch(&mut self.record, &self.config, &mut writer).await? {
                        break;
                    }
                }
                Event::Line(None) => {
                    tracing::debug!("Peer closed connection");
                    break;
                }
                Event::Line(Some(line)) => match self.record.on_line(&line, Instant::now()) {
                    LineAction::Continue => {}
                    LineAction::Dispatch { delay: None } => {
                        if Self::dispatch(&mut self.record, &self.config, &mut writer).await? {
                            break;
                        }
                    }
                    LineAction::Dispatch { delay: Some(delay) } => {
                        tracing::debug!(?delay, "Delaying response");
                        pending = Some(Box::pin(tokio::time::sleep(delay)));
                    }
                    LineAction::Hang { disconnect: true } => break,
                    LineAction::Hang { disconnect: false } => {
                        // No more lines reach the record; input is only
                        // drained to notice the peer going away.
                        tokio::select! {
                            _ = self.registration.closed() => tracing::debug!("Hang ended by idle sweep"),
                            _ = peer_closed(lines.get_mut()) => tracing::debug!("Peer closed while hanging"),
                        }
                        break;
                    }
                    LineAction::Close => break,
                },
            }
        }

        Ok(())
    }

    /// Runs the dispatcher and writes its response, if any.
    ///
    /// Returns true once a response has been written and the connection
    /// should close.
    async fn dispatch<W>(
        record: &mut ConnectionRecord,
        config: &Config,
        writer: &mut W,
    ) -> anyhow::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        let dispatch = respond(record, &config.bind_addr(), Instant::now());
        let Some(response) = dispatch.response() else {
            return Ok(false);
        };

        if let Dispatch::Error(_) = dispatch {
            tracing::info!(
                status = response.status.as_u16(),
                path = %record.raw_path,
                "Responding with error"
            );
        }

        ResponseWriter::new(response).write_to_stream(writer).await?;
        writer.shutdown().await?;
        Ok(true)
    }
}

async fn delay_elapsed(pending: &mut Option<Pin<Box<Sleep>>>) {
    match pending {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Discards input until end-of-stream or a read error.
async fn peer_closed<R>(reader: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 1024];
    while let Ok(n) = reader.read(&mut scratch).await {
        if n == 0 {
            break;
        }
    }
}
