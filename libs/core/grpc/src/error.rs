use thiserror::Error;

pub type GrpcResult<T> = Result<T, GrpcError>;

/// Errors raised by channel creation and the connection pools
#[derive(Error, Debug)]
pub enum GrpcError {
  /// Invalid URI provided for connection
  #[error("Invalid URI: {0}")]
  InvalidUri(#[from] tonic::transport::Error),

  /// A transport for a new connection manager could not be built
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),

  /// Invalid configuration
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  /// Every manager is at its stream limit and the pool cannot grow
  #[error("Capacity exhausted: {0}")]
  CapacityExhausted(String),

  /// The pool was closed while the request was waiting
  #[error("Connection pool is shutting down")]
  PoolShuttingDown,

  /// The manager's transport has already been released
  #[error("Connection has been closed")]
  ConnectionClosed,
}

impl GrpcError {
  /// Errors the caller may recover from by backing off and trying again
  pub fn is_recoverable(&self) -> bool {
    matches!(self, GrpcError::CapacityExhausted(_))
  }
}

impl From<GrpcError> for tonic::Status {
  fn from(err: GrpcError) -> Self {
    match err {
      GrpcError::InvalidUri(_) | GrpcError::InvalidConfig(_) => {
        tonic::Status::invalid_argument(err.to_string())
      }
      GrpcError::ConnectionFailed(_) => tonic::Status::unavailable(err.to_string()),
      GrpcError::CapacityExhausted(_) => tonic::Status::resource_exhausted(err.to_string()),
      GrpcError::PoolShuttingDown | GrpcError::ConnectionClosed => {
        tonic::Status::cancelled(err.to_string())
      }
    }
  }
}
