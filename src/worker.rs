use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::commands::Command;
use crate::consts::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_LIVENESS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RECONNECT_DELAY_MS, MDPW_WORKER, MINIMUM_MESSAGE_FRAMES,
};
use crate::error::{WorkerError, WorkerResult};
use crate::shutdown::{ShutdownHandle, ShutdownSignal};
use crate::transport::{Transport, TransportSocket};

/// Application handler invoked once per REQUEST. Gets the request
/// payload frames, returns the reply payload frames; either side may be
/// empty. The worker never retries or times a handler out, and error
/// encoding inside the reply frames is the handler's concern.
pub trait WorkerAction {
    fn call(&mut self, request: Vec<Vec<u8>>) -> Vec<Vec<u8>>;
}

impl<F> WorkerAction for F
where
    F: FnMut(Vec<Vec<u8>>) -> Vec<Vec<u8>>,
{
    fn call(&mut self, request: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        self(request)
    }
}

/// Fixed at construction; timing defaults follow the Majordomo guide
/// values.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub broker_endpoint: String,
    pub service_name: Vec<u8>,
    /// Gap between outbound heartbeats when the worker is otherwise
    /// silent.
    pub heartbeat_interval: Duration,
    /// How long to sleep after broker liveness is lost before the next
    /// handshake.
    pub reconnect_delay: Duration,
    /// Upper bound on a single blocking poll.
    pub poll_interval: Duration,
    /// Consecutive empty polls tolerated before the broker is declared
    /// dead. Must be positive.
    pub max_liveness: u32,
}

impl WorkerConfig {
    pub fn new(broker_endpoint: impl Into<String>, service_name: impl Into<Vec<u8>>) -> Self {
        Self {
            broker_endpoint: broker_endpoint.into(),
            service_name: service_name.into(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_liveness: DEFAULT_MAX_LIVENESS,
        }
    }

    fn validate(&self) -> WorkerResult<()> {
        if self.max_liveness == 0 {
            return Err(WorkerError::Configuration("max_liveness must be positive"));
        }
        Ok(())
    }
}

/// MDP/Worker v0.1 service worker.
///
/// Construction connects to the broker and sends the READY handshake;
/// [`Worker::receive`] then drives one request/reply round trip at a
/// time. All socket work happens on the thread that calls `receive`;
/// the [`ShutdownHandle`] is the only cross-thread touchpoint.
pub struct Worker<T: Transport, A: WorkerAction> {
    transport: T,
    config: WorkerConfig,
    action: A,

    /// Present from a successful handshake until its replacement on
    /// reconnect or release on shutdown.
    socket: Option<T::Socket>,
    /// How many empty polls are left before the broker is declared
    /// dead.
    liveness: u32,
    /// When the next outbound heartbeat is due.
    heartbeat_at: Instant,
    shutdown: ShutdownSignal,
}

impl<T: Transport, A: WorkerAction> Worker<T, A> {
    /// Connect to the broker and register `service_name` via READY.
    ///
    /// The worker takes ownership of the transport and terminates it
    /// during graceful shutdown.
    pub fn new(transport: T, config: WorkerConfig, action: A) -> WorkerResult<Self> {
        config.validate()?;
        let mut worker = Self {
            transport,
            action,
            socket: None,
            liveness: 0,
            heartbeat_at: Instant::now() + config.heartbeat_interval,
            shutdown: ShutdownSignal::new(),
            config,
        };
        worker.reconnect_to_broker()?;
        Ok(worker)
    }

    /// Handle for requesting a graceful shutdown from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// Run the worker until one REQUEST has been processed and its
    /// REPLY sent, returning the handler's reply frames; or until a
    /// shutdown is observed, returning [`WorkerError::Shutdown`] after
    /// releasing the socket and transport context.
    ///
    /// Blocks the calling thread, yielding to the transport in polls of
    /// at most `poll_interval`. Not safe for concurrent entry; there is
    /// exactly one invoker at a time.
    pub fn receive(&mut self) -> WorkerResult<Vec<Vec<u8>>> {
        loop {
            if self.shutdown.is_triggered() {
                self.cleanup();
                return Err(WorkerError::Shutdown);
            }

            let readable = match self.poll() {
                Ok(readable) => readable,
                Err(e) => {
                    error!("Polling socket failed, error: {e}");
                    continue;
                }
            };

            if readable {
                let frames = match self.recv() {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!("Receiving from socket failed, error: {e}");
                        continue;
                    }
                };
                if frames.len() < MINIMUM_MESSAGE_FRAMES {
                    error!(
                        "Received invalid message (not enough frames), received {}",
                        frames.len()
                    );
                    continue;
                }

                // Anything well-formed from the broker counts as a
                // heartbeat, whatever the command.
                self.liveness = self.config.max_liveness;

                match Command::from_frame(&frames[2]) {
                    Some(Command::Request) => {
                        if let Some(reply) = self.handle_request(frames) {
                            return Ok(reply);
                        }
                    }
                    Some(Command::Disconnect) => {
                        debug!("Received Disconnect from broker");
                        self.reconnect_until_connected();
                    }
                    Some(Command::Heartbeat) => {
                        debug!("Received Heartbeat from broker");
                    }
                    Some(command) => {
                        debug!("Ignoring unexpected {command} from broker");
                    }
                    None => {
                        debug!("Ignoring unknown command from broker");
                    }
                }
            } else {
                self.liveness = self.liveness.saturating_sub(1);
                if self.liveness == 0 {
                    warn!(
                        "Worker has received nothing from the broker for {} polls, sleeping for {:?} and reconnecting",
                        self.config.max_liveness, self.config.reconnect_delay
                    );
                    sleep(self.config.reconnect_delay);
                    self.reconnect_until_connected();
                }
            }

            if Instant::now() >= self.heartbeat_at {
                if let Err(e) = self.send_to_broker(Command::Heartbeat, None, None) {
                    error!("Failed to send Heartbeat to broker: {e}");
                }
                self.heartbeat_at = Instant::now() + self.config.heartbeat_interval;
            }
        }
    }

    /// Dispatch one REQUEST to the handler and send the REPLY. Returns
    /// `None` when the envelope carries no client identity to reply to.
    fn handle_request(&mut self, frames: Vec<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
        if frames.len() < 4 {
            error!("Received Request with no client identity, dropping");
            return None;
        }
        let reply_to = frames[3].clone();
        // Frame 4 is the empty delimiter; payload starts at frame 5.
        let request = frames.get(5..).map(<[_]>::to_vec).unwrap_or_default();
        debug!(
            "Received Request from client {} with {} payload frame(s)",
            hex::encode(&reply_to),
            request.len()
        );

        let response = self.action.call(request);

        let mut body = Vec::with_capacity(2 + response.len());
        body.push(reply_to);
        body.push(Vec::new());
        body.extend(response.iter().cloned());
        if let Err(e) = self.send_to_broker(Command::Reply, None, Some(body)) {
            error!("Failed to send Reply to broker: {e}");
        }
        Some(response)
    }

    /// Reconnect from inside the receive loop, where a failed socket
    /// open is as transient as any other transport fault: log it and
    /// keep trying until a socket comes up or a shutdown is observed.
    fn reconnect_until_connected(&mut self) {
        while let Err(e) = self.reconnect_to_broker() {
            error!("Reconnecting to broker failed, error: {e}");
            if self.shutdown.is_triggered() {
                return;
            }
            sleep(self.config.reconnect_delay);
        }
    }

    /// Drop the current socket, open a fresh one and redo the READY
    /// handshake. Linger is zero, so anything still queued on the old
    /// socket is discarded with it.
    fn reconnect_to_broker(&mut self) -> WorkerResult<()> {
        self.socket = None;
        debug!(
            "Attempting connection to broker at '{}'",
            self.config.broker_endpoint
        );
        self.socket = Some(self.transport.open(&self.config.broker_endpoint)?);
        if let Err(e) = self.send_to_broker(Command::Ready, Some(&self.config.service_name), None) {
            error!("Failed to send Ready to broker: {e}");
        }
        self.liveness = self.config.max_liveness;
        self.heartbeat_at = Instant::now() + self.config.heartbeat_interval;
        Ok(())
    }

    // Protocol order is:
    //  1. Empty frame
    //  2. Identifier
    //  3. Command
    //  4. Option (READY's service name)
    //  5. Existing message
    fn send_to_broker(
        &self,
        command: Command,
        option: Option<&[u8]>,
        body: Option<Vec<Vec<u8>>>,
    ) -> WorkerResult<()> {
        let mut message: Vec<Vec<u8>> = vec![
            Vec::new(),
            MDPW_WORKER.as_bytes().to_vec(),
            vec![command.as_byte()],
        ];
        if let Some(option) = option {
            message.push(option.to_vec());
        }
        if let Some(body) = body {
            message.extend(body);
        }
        debug!("Sending {command} to broker");
        self.socket()?.send_multipart(message)
    }

    fn poll(&self) -> WorkerResult<bool> {
        self.socket()?.poll_readable(self.config.poll_interval)
    }

    fn recv(&self) -> WorkerResult<Vec<Vec<u8>>> {
        self.socket()?.recv_multipart()
    }

    fn socket(&self) -> WorkerResult<&T::Socket> {
        self.socket
            .as_ref()
            .ok_or(WorkerError::Configuration("worker is not connected"))
    }

    fn cleanup(&mut self) {
        self.socket = None;
        if let Err(e) = self.transport.terminate() {
            error!("Failed to terminate transport context: {e}");
        }
        debug!("Worker socket and context closed successfully");
    }

    #[cfg(test)]
    pub(crate) fn liveness(&self) -> u32 {
        self.liveness
    }
}
