use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Socket factory plus the context it hands sockets out of.
///
/// The worker owns its transport and terminates it during cleanup, so a
/// caller that passes a shared context in must expect it to die with
/// the worker.
pub trait Transport {
    type Socket: TransportSocket;

    /// Open a fresh DEALER-style socket connected to `endpoint`, with
    /// linger zero so sends queued on a dead connection are dropped.
    fn open(&mut self, endpoint: &str) -> WorkerResult<Self::Socket>;

    /// Release the context. Called once during graceful shutdown;
    /// subsequent calls must be no-ops.
    fn terminate(&mut self) -> WorkerResult<()>;
}

/// The slice of socket behavior the worker state machine needs. Sockets
/// close on drop.
pub trait TransportSocket {
    /// Wait up to `timeout` for the socket to become readable.
    fn poll_readable(&self, timeout: Duration) -> WorkerResult<bool>;

    fn send_multipart(&self, frames: Vec<Vec<u8>>) -> WorkerResult<()>;

    fn recv_multipart(&self) -> WorkerResult<Vec<Vec<u8>>>;
}

/// Production transport over a ZeroMQ context.
pub struct ZmqTransport {
    context: Option<zmq::Context>,
}

impl ZmqTransport {
    /// Wrap an existing context. The transport takes ownership and
    /// destroys it on `terminate`.
    pub fn new(context: zmq::Context) -> Self {
        Self {
            context: Some(context),
        }
    }
}

impl Default for ZmqTransport {
    fn default() -> Self {
        Self::new(zmq::Context::new())
    }
}

impl Transport for ZmqTransport {
    type Socket = zmq::Socket;

    fn open(&mut self, endpoint: &str) -> WorkerResult<zmq::Socket> {
        let context = self
            .context
            .as_ref()
            .ok_or(WorkerError::Configuration("transport already terminated"))?;
        let socket = context.socket(zmq::DEALER)?;
        socket.set_linger(0)?;
        socket.connect(endpoint)?;
        Ok(socket)
    }

    fn terminate(&mut self) -> WorkerResult<()> {
        if let Some(mut context) = self.context.take() {
            context.destroy()?;
        }
        Ok(())
    }
}

impl TransportSocket for zmq::Socket {
    fn poll_readable(&self, timeout: Duration) -> WorkerResult<bool> {
        let events = self.poll(zmq::POLLIN, timeout.as_millis() as i64)?;
        Ok(events > 0)
    }

    fn send_multipart(&self, frames: Vec<Vec<u8>>) -> WorkerResult<()> {
        zmq::Socket::send_multipart(self, frames, 0)?;
        Ok(())
    }

    fn recv_multipart(&self) -> WorkerResult<Vec<Vec<u8>>> {
        let frames = zmq::Socket::recv_multipart(self, 0)?;
        Ok(frames)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for driving the worker state machine without
    //! a broker. Each poll consumes one script step; outbound traffic
    //! is recorded per socket generation.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use crate::error::{WorkerError, WorkerResult};
    use crate::shutdown::ShutdownHandle;

    use super::{Transport, TransportSocket};

    pub(crate) enum ScriptStep {
        /// Poll times out with nothing readable.
        Timeout,
        /// Poll reports readable; the next recv returns these frames.
        Deliver(Vec<Vec<u8>>),
        /// Poll itself fails.
        PollError(&'static str),
        /// Raise the worker's shutdown flag, then time out.
        SignalShutdown,
    }

    #[derive(Debug, Clone)]
    pub(crate) struct SentMessage {
        pub socket: usize,
        pub frames: Vec<Vec<u8>>,
        pub at: Instant,
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        script: VecDeque<ScriptStep>,
        pending_recv: Option<Vec<Vec<u8>>>,
        pub sent: Vec<SentMessage>,
        pub opened: usize,
        pub closed: usize,
        pub terminated: bool,
        /// How many upcoming `open` calls fail before one succeeds.
        pub open_failures: usize,
        shutdown: Option<ShutdownHandle>,
    }

    impl MockState {
        pub(crate) fn ready_messages(&self) -> Vec<&SentMessage> {
            self.sent
                .iter()
                .filter(|m| m.frames[2] == [0x01])
                .collect()
        }

        pub(crate) fn heartbeat_messages(&self) -> Vec<&SentMessage> {
            self.sent
                .iter()
                .filter(|m| m.frames[2] == [0x04])
                .collect()
        }
    }

    #[derive(Clone)]
    pub(crate) struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub(crate) fn new(script: Vec<ScriptStep>) -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    script: script.into(),
                    ..MockState::default()
                })),
            }
        }

        /// Shutdown handle fired by `ScriptStep::SignalShutdown`, and as
        /// a backstop when the script runs dry.
        pub(crate) fn arm_shutdown(&self, handle: ShutdownHandle) {
            self.state.lock().unwrap().shutdown = Some(handle);
        }

        pub(crate) fn state(&self) -> Arc<Mutex<MockState>> {
            Arc::clone(&self.state)
        }
    }

    impl Transport for MockTransport {
        type Socket = MockSocket;

        fn open(&mut self, _endpoint: &str) -> WorkerResult<MockSocket> {
            let mut state = self.state.lock().unwrap();
            if state.open_failures > 0 {
                state.open_failures -= 1;
                return Err(WorkerError::Transport(
                    "injected socket open failure".to_string(),
                ));
            }
            state.opened += 1;
            Ok(MockSocket {
                id: state.opened,
                state: Arc::clone(&self.state),
            })
        }

        fn terminate(&mut self) -> WorkerResult<()> {
            self.state.lock().unwrap().terminated = true;
            Ok(())
        }
    }

    pub(crate) struct MockSocket {
        id: usize,
        state: Arc<Mutex<MockState>>,
    }

    impl Drop for MockSocket {
        fn drop(&mut self) {
            self.state.lock().unwrap().closed += 1;
        }
    }

    impl TransportSocket for MockSocket {
        fn poll_readable(&self, timeout: Duration) -> WorkerResult<bool> {
            let step = {
                let mut state = self.state.lock().unwrap();
                state.script.pop_front()
            };
            match step {
                Some(ScriptStep::Timeout) => {
                    std::thread::sleep(timeout);
                    Ok(false)
                }
                Some(ScriptStep::Deliver(frames)) => {
                    self.state.lock().unwrap().pending_recv = Some(frames);
                    Ok(true)
                }
                Some(ScriptStep::PollError(message)) => {
                    Err(WorkerError::Transport(message.to_string()))
                }
                Some(ScriptStep::SignalShutdown) | None => {
                    // Script exhausted: stop the worker instead of
                    // letting the test spin forever.
                    if let Some(handle) = &self.state.lock().unwrap().shutdown {
                        handle.shutdown();
                    }
                    Ok(false)
                }
            }
        }

        fn send_multipart(&self, frames: Vec<Vec<u8>>) -> WorkerResult<()> {
            self.state.lock().unwrap().sent.push(SentMessage {
                socket: self.id,
                frames,
                at: Instant::now(),
            });
            Ok(())
        }

        fn recv_multipart(&self) -> WorkerResult<Vec<Vec<u8>>> {
            self.state
                .lock()
                .unwrap()
                .pending_recv
                .take()
                .ok_or_else(|| WorkerError::Transport("nothing to receive".to_string()))
        }
    }
}
