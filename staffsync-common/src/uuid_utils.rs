//! UUID utilities

use uuid::Uuid;

/// Prefix marking a client-generated provisional assignment id
pub const PROVISIONAL_PREFIX: &str = "tmp-";

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate an unguessable provisional id for an optimistic insert
///
/// Never collides with server ids, which do not carry the prefix.
pub fn provisional_id() -> String {
    format!("{}{}", PROVISIONAL_PREFIX, generate().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_prefixed_and_distinct() {
        let a = provisional_id();
        let b = provisional_id();
        assert!(a.starts_with(PROVISIONAL_PREFIX));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a[PROVISIONAL_PREFIX.len()..]).is_ok());
    }
}
