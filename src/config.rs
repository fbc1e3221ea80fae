use std::env;

use crate::payments::stripe::StripeConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub client_url: String,
    pub stripe: StripeConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        // Stripe keys may be absent at boot; payment endpoints surface a
        // gateway error instead of the process refusing to start.
        let stripe = StripeConfig {
            secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
        };

        Ok(Self {
            database_url,
            host,
            port,
            client_url,
            stripe,
        })
    }
}
