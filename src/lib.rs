use std::sync::Arc;

use config::Config;
use credentials::CredentialCodec;
use gateway::ProviderGateway;
use middleware::RateLimiter;

pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub codec: CredentialCodec,
    pub gateway: ProviderGateway,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let codec = CredentialCodec::new(config.credentials_secret.as_deref());
        let gateway = ProviderGateway::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            codec,
            gateway,
            limiter: Arc::new(RateLimiter::new()),
        })
    }
}
