use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub tokens: TokenSettings,
    pub email: EmailSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Access token signing settings.
///
/// The secret is loaded once at startup and injected where needed;
/// rotating it invalidates outstanding access tokens but leaves
/// refresh tokens untouched.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64, // seconds (e.g., 900 for 15 minutes)
    pub issuer: String,
}

/// Lifetimes for stored tokens, per purpose.
///
/// Password-reset links are deliberately shorter-lived than
/// email-verification links.
#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    pub refresh_token_expiry: i64,     // seconds (e.g., 604800 for 7 days)
    pub reset_token_expiry: i64,       // seconds (e.g., 1800 for 30 minutes)
    pub verify_email_token_expiry: i64, // seconds (e.g., 86400 for 1 day)
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailSettings {
    /// Base URL of the mail relay service.
    pub relay_url: String,
    /// Sender address presented to the relay.
    pub sender: String,
    /// Base URL embedded into reset/verification links.
    pub link_base_url: String,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    settings.try_deserialize::<Settings>()
}
