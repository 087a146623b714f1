pub mod config;

pub use config::ChannelConfig;

use crate::error::{GrpcError, GrpcResult};
use crate::pool::{Connection, ConnectionFactory};
use tonic::transport::{Channel, Endpoint};

/// Creates a lazy gRPC channel that connects on first request
///
/// Returns immediately without establishing a connection; the connection is
/// made when the first RPC is issued. `https` endpoints get TLS.
///
/// ## Example
/// ```ignore
/// use grpc_client::{create_channel_lazy, ChannelConfig};
/// use protos::cache_client::pubsub::pubsub_client::PubsubClient;
///
/// let channel = create_channel_lazy("https://cache.example.com:443", &ChannelConfig::default())?;
/// let client = PubsubClient::new(channel);
/// ```
pub fn create_channel_lazy(addr: impl Into<String>, config: &ChannelConfig) -> GrpcResult<Channel> {
  let addr_string = addr.into();

  let endpoint = Endpoint::from_shared(addr_string.clone()).map_err(|e| {
    tracing::error!(target: "grpc_client", addr = %addr_string, error = ?e, "Invalid URI");
    GrpcError::InvalidUri(e)
  })?;

  let secure = endpoint.uri().scheme_str() == Some("https");
  let endpoint = config.apply_to_endpoint(endpoint, secure).map_err(|e| {
    tracing::error!(target: "grpc_client", addr = %addr_string, error = %e, "Invalid channel configuration");
    e
  })?;

  tracing::debug!(
    target: "grpc_client",
    addr = %addr_string,
    secure,
    "Creating lazy gRPC channel (connects on first request)"
  );

  Ok(endpoint.connect_lazy())
}

/// Tonic channels close when the last clone is dropped. The manager drops its
/// clone on close, and streams drop theirs when the manager's close signal fires.
impl Connection for Channel {}

/// Builds one lazy channel per connection manager
#[derive(Debug, Clone)]
pub struct ChannelFactory {
  endpoint: String,
  config: ChannelConfig,
}

impl ChannelFactory {
  pub fn new(endpoint: impl Into<String>, config: ChannelConfig) -> Self {
    Self {
      endpoint: endpoint.into(),
      config,
    }
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn config(&self) -> &ChannelConfig {
    &self.config
  }
}

impl ConnectionFactory for ChannelFactory {
  type Connection = Channel;

  fn connect(&self) -> GrpcResult<Channel> {
    create_channel_lazy(self.endpoint.clone(), &self.config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_uri() {
    let result = create_channel_lazy("not a valid uri", &ChannelConfig::default());
    assert!(matches!(result, Err(GrpcError::InvalidUri(_))));
  }

  #[tokio::test]
  async fn test_lazy_channel_does_not_connect() {
    // Nothing listens here; a lazy channel is still created.
    let result = create_channel_lazy("http://127.0.0.1:9", &ChannelConfig::default());
    assert!(result.is_ok());
  }

  #[tokio::test]
  async fn test_factory_builds_independent_channels() {
    let factory = ChannelFactory::new("http://127.0.0.1:9", ChannelConfig::default());
    assert!(factory.connect().is_ok());
    assert!(factory.connect().is_ok());
    assert_eq!(factory.endpoint(), "http://127.0.0.1:9");
  }
}
