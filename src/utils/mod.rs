// src/utils/mod.rs - Small shared helpers

use rand::RngCore;

/// Byte length of the random secure token shared by all matches of one
/// orchestration run.
const SECURE_TOKEN_BYTES: usize = 32;

/// Returns the first source in the chain that is non-empty after trimming.
///
/// Used to make optional-field fallback cascades (payload value, else
/// form-session value, else profile value) explicit and testable instead of
/// scattering `or_else` chains through the orchestrator.
pub fn first_non_empty<'a, I>(sources: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    sources
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Generates an opaque, unguessable hex token for match links.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; SECURE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_empty_picks_first_usable_source() {
        let payload: Option<&str> = None;
        let session = Some("   ");
        let profile = Some("Berlin");
        assert_eq!(
            first_non_empty([payload, session, profile]),
            Some("Berlin")
        );
    }

    #[test]
    fn test_first_non_empty_respects_order() {
        assert_eq!(
            first_non_empty([Some("first"), Some("second")]),
            Some("first")
        );
        assert_eq!(first_non_empty([None, None]), None);
    }

    #[test]
    fn test_secure_token_shape() {
        let token = generate_secure_token();
        assert_eq!(token.len(), SECURE_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        // Two tokens should essentially never collide.
        assert_ne!(token, generate_secure_token());
    }
}
