use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub email_api_key: String,
    pub email_api_base_url: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_email: String,
    pub subject_prefix: String,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            email_api_key: std::env::var("EMAIL_API_KEY")
                .map_err(|_| anyhow::anyhow!("EMAIL_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("EMAIL_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            email_api_base_url: std::env::var("EMAIL_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.brevo.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            sender_name: std::env::var("SENDER_NAME")
                .unwrap_or_else(|_| "Registrazione Ospiti".to_string()),
            sender_email: std::env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "noreply@checkin.local".to_string()),
            recipient_email: std::env::var("RECIPIENT_EMAIL")
                .unwrap_or_else(|_| "gestore@checkin.local".to_string()),
            subject_prefix: std::env::var("SUBJECT_PREFIX")
                .unwrap_or_else(|_| "Check-in".to_string()),
            rate_limit_max: std::env::var("RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_MAX must be a positive number"))?,
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("RATE_LIMIT_WINDOW_SECS must be a number of seconds")
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Email API base URL: {}", config.email_api_base_url);
        tracing::debug!("Recipient: {}", config.recipient_email);
        tracing::debug!(
            "Rate limit: {} submissions per {}s window",
            config.rate_limit_max,
            config.rate_limit_window_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
