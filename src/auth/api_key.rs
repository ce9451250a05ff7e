use rand::distributions::Alphanumeric;
use rand::Rng;

const API_KEY_LEN: usize = 40;

/// Opaque bearer credential handed out at registration.
pub fn generate_api_key() -> String {
    let key: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect();
    format!("key-{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_shape() {
        let key = generate_api_key();
        assert!(key.starts_with("key-"));
        assert_eq!(key.len(), 4 + API_KEY_LEN);
        assert!(key[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_api_keys_are_distinct() {
        assert_ne!(generate_api_key(), generate_api_key());
    }
}
