use core_config::ConfigError;
use grpc_client::GrpcError;
use thiserror::Error;
use tonic::Code;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(#[from] GrpcError),

    #[error("Service error: {}: {}", .0.code(), .0.message())]
    Service(#[from] tonic::Status),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type TopicResult<T> = Result<T, TopicError>;

impl TopicError {
    /// gRPC status code equivalent, for callers that branch on codes
    pub fn code(&self) -> Code {
        match self {
            TopicError::InvalidArgument(_) | TopicError::Config(_) => Code::InvalidArgument,
            TopicError::Transport(GrpcError::CapacityExhausted(_)) => Code::ResourceExhausted,
            TopicError::Transport(GrpcError::PoolShuttingDown | GrpcError::ConnectionClosed) => {
                Code::Cancelled
            }
            TopicError::Transport(GrpcError::InvalidUri(_) | GrpcError::InvalidConfig(_)) => {
                Code::InvalidArgument
            }
            TopicError::Transport(GrpcError::ConnectionFailed(_)) => Code::Unavailable,
            TopicError::Service(status) => status.code(),
            TopicError::Timeout(_) => Code::DeadlineExceeded,
            TopicError::UnexpectedMessage(_) => Code::Internal,
        }
    }

    /// Whether backing off and trying again may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            TopicError::Transport(err) => err.is_recoverable(),
            TopicError::Service(status) => matches!(
                status.code(),
                Code::Unavailable | Code::ResourceExhausted | Code::Internal
            ),
            TopicError::Timeout(_) => true,
            _ => false,
        }
    }
}
