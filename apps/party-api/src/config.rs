/// Party API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the social/catalog backend that owns users, friendships,
    /// and notifications (e.g. `http://localhost:4001`).
    pub social_api_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// How long a room survives after its host's transport drops before it
    /// is destroyed (seconds).
    pub host_grace_secs: u64,
    /// How long an unmute request stays pending before it resolves as an
    /// implicit reject (seconds).
    pub unmute_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            social_api_url: required_var("SOCIAL_API_URL"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4003),
            host_grace_secs: std::env::var("HOST_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            unmute_timeout_secs: std::env::var("UNMUTE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
