//! # Keepers
//!
//! Pluggable encryption backends. Every stored value records the id and
//! address of the keeper that encoded it, so decode always reaches the right
//! backend even after the default keeper changes.

pub mod backend;
pub mod local;
pub mod registry;
pub mod vault;

pub use backend::Keeper;
pub use local::{LocalKeeper, LOCAL_ADDRESS};
pub use registry::KeeperRegistry;
pub use vault::VaultTransitKeeper;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Length of the per-value salt
pub const SALT_LENGTH: usize = 10;

/// Fresh random salt for one encoded value
pub fn generate_salt() -> String {
    OsRng.sample_iter(&Alphanumeric).take(SALT_LENGTH).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_salt_shape() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LENGTH);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_salts_differ() {
        let salts: HashSet<String> = (0..100).map(|_| generate_salt()).collect();
        assert_eq!(salts.len(), 100);
    }
}
