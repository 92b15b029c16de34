use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = watchtide_common::id::prefixed_ulid("msg");
/// assert!(id.starts_with("msg_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
    pub const MESSAGE: &str = "msg";
    pub const REACTION: &str = "rx";
    pub const POLL: &str = "poll";
    pub const UNMUTE_REQUEST: &str = "req";
}
