use tonic::metadata::MetadataValue;
use tonic::{Request, Status};

/// Interceptor that attaches the auth token and client identification headers
///
/// The token is sent verbatim in `authorization`; the `agent` header tells
/// the service which client library and version is calling.
///
/// # Example
/// ```ignore
/// use grpc_client::interceptors::AuthInterceptor;
/// use protos::cache_client::pubsub::pubsub_client::PubsubClient;
///
/// let auth = AuthInterceptor::new(credentials.auth_token(), "topic");
/// let client = PubsubClient::with_interceptor(channel, auth);
/// ```
#[derive(Clone, Debug)]
pub struct AuthInterceptor {
    authorization: MetadataValue<tonic::metadata::Ascii>,
    agent: MetadataValue<tonic::metadata::Ascii>,
}

impl AuthInterceptor {
    /// Build an interceptor for `client_type` (for example `"topic"`).
    ///
    /// Fails if the token contains characters not allowed in a header.
    pub fn new(token: &str, client_type: &str) -> Result<Self, Status> {
        let authorization = token
            .parse()
            .map_err(|_| Status::invalid_argument("Invalid auth token"))?;
        let agent = format!("rust:{}:{}", client_type, env!("CARGO_PKG_VERSION"))
            .parse()
            .map_err(|_| Status::invalid_argument("Invalid client type"))?;
        Ok(Self {
            authorization,
            agent,
        })
    }
}

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert("authorization", self.authorization.clone());
        metadata.insert("agent", self.agent.clone());
        Ok(request)
    }
}
