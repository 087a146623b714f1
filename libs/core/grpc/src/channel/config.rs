use std::time::Duration;
use tonic::transport::Endpoint;

use crate::error::GrpcResult;

/// Configuration for topic channel creation
///
/// Keep-alive defaults are tuned for long-lived subscription streams: pings
/// continue while no call is active so idle subscribers notice dead
/// connections quickly.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
  // HTTP/2 Keep-Alive
  pub http2_keep_alive_interval: Option<Duration>,
  pub keep_alive_timeout: Duration,
  pub keep_alive_while_idle: bool,

  // Connection settings
  pub connect_timeout: Duration,
  /// Transport-level request timeout. Left unset by default; per-call
  /// deadlines come from the retry interceptor.
  pub timeout: Option<Duration>,

  // Window sizes (HTTP/2 flow control)
  pub initial_connection_window_size: Option<u32>,
  pub initial_stream_window_size: Option<u32>,
  pub http2_adaptive_window: bool,

  // TCP settings
  pub tcp_nodelay: bool,
  pub tcp_keepalive: Option<Duration>,

  // Message limits, applied to clients built on these channels
  pub max_send_message_size: usize,
  pub max_receive_message_size: usize,
}

impl Default for ChannelConfig {
  fn default() -> Self {
    Self {
      http2_keep_alive_interval: Some(Duration::from_secs(5)),
      keep_alive_timeout: Duration::from_secs(1),
      keep_alive_while_idle: true,
      connect_timeout: Duration::from_secs(5),
      timeout: None,
      initial_connection_window_size: Some(1024 * 1024), // 1MB
      initial_stream_window_size: Some(1024 * 1024),     // 1MB
      http2_adaptive_window: true,
      tcp_nodelay: true,
      tcp_keepalive: Some(Duration::from_secs(30)),
      max_send_message_size: 5 * 1024 * 1024,
      max_receive_message_size: 5 * 1024 * 1024,
    }
  }
}

impl ChannelConfig {
  /// Create a new configuration with production defaults
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the connection timeout
  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }

  /// Set a transport-level timeout for individual RPCs
  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Set the HTTP/2 keep-alive interval
  ///
  /// # Example
  /// ```ignore
  /// let config = ChannelConfig::new()
  ///     .with_keep_alive_interval(Duration::from_secs(10));
  /// ```
  pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
    self.http2_keep_alive_interval = Some(interval);
    self
  }

  /// Disable HTTP/2 keep-alive
  pub fn without_keep_alive(mut self) -> Self {
    self.http2_keep_alive_interval = None;
    self.keep_alive_while_idle = false;
    self
  }

  /// Set both connection and stream window sizes to the same value
  pub fn with_window_size(mut self, size: u32) -> Self {
    self.initial_connection_window_size = Some(size);
    self.initial_stream_window_size = Some(size);
    self
  }

  /// Set both send and receive message limits
  pub fn with_message_size_limit(mut self, limit: usize) -> Self {
    self.max_send_message_size = limit;
    self.max_receive_message_size = limit;
    self
  }

  /// Apply this configuration to a tonic Endpoint
  ///
  /// `secure` turns on TLS with the platform's native roots; this needs the
  /// `tls` feature.
  pub(crate) fn apply_to_endpoint(&self, mut endpoint: Endpoint, secure: bool) -> GrpcResult<Endpoint> {
    if let Some(interval) = self.http2_keep_alive_interval {
      endpoint = endpoint.http2_keep_alive_interval(interval);
    }
    endpoint = endpoint
      .keep_alive_timeout(self.keep_alive_timeout)
      .keep_alive_while_idle(self.keep_alive_while_idle)
      .connect_timeout(self.connect_timeout);

    if let Some(timeout) = self.timeout {
      endpoint = endpoint.timeout(timeout);
    }

    if let Some(size) = self.initial_connection_window_size {
      endpoint = endpoint.initial_connection_window_size(size);
    }
    if let Some(size) = self.initial_stream_window_size {
      endpoint = endpoint.initial_stream_window_size(size);
    }
    endpoint = endpoint.http2_adaptive_window(self.http2_adaptive_window);

    endpoint = endpoint.tcp_nodelay(self.tcp_nodelay);
    if let Some(keepalive) = self.tcp_keepalive {
      endpoint = endpoint.tcp_keepalive(Some(keepalive));
    }

    if secure {
      endpoint = apply_tls(endpoint)?;
    }

    Ok(endpoint)
  }
}

#[cfg(feature = "tls")]
fn apply_tls(endpoint: Endpoint) -> GrpcResult<Endpoint> {
  use tonic::transport::ClientTlsConfig;

  endpoint
    .tls_config(ClientTlsConfig::new().with_native_roots())
    .map_err(|e| crate::error::GrpcError::InvalidConfig(format!("TLS setup failed: {e}")))
}

#[cfg(not(feature = "tls"))]
fn apply_tls(_endpoint: Endpoint) -> GrpcResult<Endpoint> {
  Err(crate::error::GrpcError::InvalidConfig(
    "https endpoint requires the `tls` feature of grpc-client".to_string(),
  ))
}
