use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regstore_types::{ObjectKey, ResourceVersion};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Position of a truncated list: the snapshot revision and the last key
/// already returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueToken {
    pub rv: ResourceVersion,
    pub start: ObjectKey,
}

impl ContinueToken {
    pub fn encode(&self) -> StoreResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| StoreError::internal(format!("encoding continue token: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> StoreResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| StoreError::Invalid("continue token is not valid base64".into()))?;
        let parsed: Self = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Invalid(format!("malformed continue token: {e}")))?;
        if parsed.rv.is_unset() {
            return Err(StoreError::Invalid("continue token has no version".into()));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_survives_encoding() {
        let token = ContinueToken {
            rv: ResourceVersion::from_raw(42),
            start: ObjectKey::namespaced("default", "b"),
        };
        let encoded = token.encode().unwrap();
        assert!(!encoded.contains('='));
        assert_eq!(ContinueToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            ContinueToken::decode("%%%"),
            Err(StoreError::Invalid(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(
            ContinueToken::decode(&not_json),
            Err(StoreError::Invalid(_))
        ));
    }
}
