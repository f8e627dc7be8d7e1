/// Engine settings shared by all components of one client
use crate::order::PollPolicy;
use crate::protocol::NonceConfig;
use crate::transport::{HttpClientConfig, RateLimitPolicy};

/// Tunables for transport, rate limiting, nonce pooling and order polling
#[derive(Debug, Clone, Default)]
pub struct AcmeSettings {
    /// HTTP client configuration
    pub http: HttpClientConfig,
    /// Backoff policy for 429/503 responses
    pub rate_limit: RateLimitPolicy,
    /// Nonce pool watermarks and bounds
    pub nonce: NonceConfig,
    /// Order polling cadence
    pub poll: PollPolicy,
}
