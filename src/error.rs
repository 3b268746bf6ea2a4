use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    /// The only failure `receive` returns on the graceful path.
    #[error("graceful shutdown")]
    Shutdown,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("worker misconfigured: {0}")]
    Configuration(&'static str),
}

macro_rules! error_from {
    ($err:ty, $worker_error:ident) => {
        impl From<$err> for WorkerError {
            fn from(value: $err) -> Self {
                WorkerError::$worker_error(value.to_string())
            }
        }
    };
}

error_from!(zmq::Error, Transport);
