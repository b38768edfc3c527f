//! Socket ownership and the reader loop.
//!
//! The reader thread is the only consumer of the byte stream. It classifies
//! each line exactly once and hands replies to the [`ReplyRouter`] and events
//! to an [`EventSink`]. Any read failure, malformed frame, or end of stream
//! ends the loop for good; the router is closed on the way out so no caller
//! stays blocked on a reply that cannot arrive.

use std::io::{self, BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, error, warn};

use crate::error::ClientError;
use crate::protocol::{Event, Frame};
use crate::router::ReplyRouter;

const TRANSPORT_TARGET: &str = "mpv_ipc::transport";

/// Id mpv leaves on replies to commands sent without one; never allocated.
const NO_REQUEST_ID: i64 = 0;

/// Receiver of classified events.
pub(crate) trait EventSink: Send {
    /// Handles one event; must not block the reader for long.
    fn dispatch(&self, event: Event);
}

/// Why the reader loop stopped.
#[derive(Debug)]
pub(crate) enum ReaderExit {
    /// The peer closed the stream.
    EndOfStream,
    /// Reading from the stream failed.
    Io(io::Error),
    /// A line could not be decoded as a frame.
    Protocol(crate::error::ProtocolError),
}

/// Write half of the connection plus the reader thread's liveness flag.
#[derive(Debug)]
pub(crate) struct Transport {
    writer: Mutex<UnixStream>,
    alive: Arc<AtomicBool>,
}

impl Transport {
    /// Starts the reader thread on a clone of `stream`.
    pub(crate) fn start<S>(
        stream: UnixStream,
        router: Arc<ReplyRouter>,
        sink: S,
    ) -> Result<Self, ClientError>
    where
        S: EventSink + 'static,
    {
        let reader = BufReader::new(stream.try_clone()?);
        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);

        thread::Builder::new()
            .name(String::from("mpv-ipc-reader"))
            .spawn(move || {
                let exit = run_reader(reader, &router, &sink);
                flag.store(false, Ordering::Release);
                router.close();
                log_exit(&exit);
            })?;

        Ok(Self {
            writer: Mutex::new(stream),
            alive,
        })
    }

    /// Writes one complete frame.
    ///
    /// The writer lock is held for the whole frame so concurrent callers never
    /// interleave partial lines.
    pub(crate) fn send(&self, line: &[u8]) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line)?;
        writer.flush()?;
        Ok(())
    }

    /// Whether the reader thread is still running.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Closes both directions of the socket, which ends the reader loop.
    pub(crate) fn shutdown(&self) {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writer.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(target: TRANSPORT_TARGET, %error, "socket shutdown failed");
        }
    }
}

/// Reads frames until the stream ends or fails.
pub(crate) fn run_reader<R, S>(mut reader: R, router: &ReplyRouter, sink: &S) -> ReaderExit
where
    R: BufRead,
    S: EventSink + ?Sized,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return ReaderExit::EndOfStream,
            Ok(_) => {}
            Err(error) => return ReaderExit::Io(error),
        }

        let frame = line.trim_end();
        if frame.is_empty() {
            continue;
        }

        match Frame::decode(frame) {
            Ok(Frame::Reply(reply)) if reply.request_id == NO_REQUEST_ID => {
                warn!(
                    target: TRANSPORT_TARGET,
                    status = %reply.error,
                    "dropping reply without a request id"
                );
            }
            Ok(Frame::Reply(reply)) => router.push(reply.request_id, reply),
            Ok(Frame::Event(event)) => {
                debug!(target: TRANSPORT_TARGET, event = %event.name, "event received");
                sink.dispatch(event);
            }
            Err(error) if error.is_fatal() => return ReaderExit::Protocol(error),
            Err(error) => {
                error!(target: TRANSPORT_TARGET, %error, "dropping malformed event");
            }
        }
    }
}

fn log_exit(exit: &ReaderExit) {
    match exit {
        ReaderExit::EndOfStream => {
            debug!(target: TRANSPORT_TARGET, "mpv closed the connection");
        }
        ReaderExit::Io(error) => {
            warn!(target: TRANSPORT_TARGET, %error, "reading from mpv failed");
        }
        ReaderExit::Protocol(error) => {
            warn!(target: TRANSPORT_TARGET, %error, "mpv sent an unusable frame");
        }
    }
}
