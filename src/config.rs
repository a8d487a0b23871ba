use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Base URL of the payment processor API
    pub processor_base_url: String,
    /// Bearer token for the processor API
    pub processor_access_token: String,
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
    /// Seconds between stale checkout-intent sweeps
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let sweep_interval_secs: u64 = env::var("INTENT_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "coursepass.db".to_string()),
            base_url,
            processor_base_url: env::var("MP_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            processor_access_token: env::var("MP_ACCESS_TOKEN").unwrap_or_default(),
            webhook_secret: env::var("MP_WEBHOOK_SECRET").unwrap_or_default(),
            sweep_interval_secs,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
