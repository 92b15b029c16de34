pub mod id;

pub use id::prefixed_ulid;
pub use id::PrefixedId;
