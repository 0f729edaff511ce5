//! Router node key, kept in the working directory across restarts.

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::error::{Error, Result};

const PRIVATE_KEY_FILE: &str = "key.priv";
const PUBLIC_KEY_FILE: &str = "key.pub";

/// Loads the node key from `dir`, generating and persisting one if absent.
///
/// Returns the hex-encoded public key.
///
/// # Errors
///
/// Returns an error if an existing key is unreadable or malformed, or a new
/// key cannot be written.
pub async fn ensure_node_key(dir: &Path) -> Result<String> {
    let private_path = dir.join(PRIVATE_KEY_FILE);

    let signing_key = if tokio::fs::try_exists(&private_path)
        .await
        .map_err(|e| Error::Io("failed to check for node key", e))?
    {
        debug!("loading node key from {}", private_path.display());

        let contents = tokio::fs::read_to_string(&private_path)
            .await
            .map_err(|e| Error::Io("failed to read node key", e))?;
        let bytes = hex::decode(contents.trim())
            .map_err(|e| Error::Configuration(format!("node key is not hex: {e}")))?;

        SigningKey::try_from(bytes.as_slice())
            .map_err(|_| Error::Configuration("node key has invalid length".into()))?
    } else {
        let signing_key = SigningKey::generate(&mut OsRng);

        write_private_key(&private_path, &hex::encode(signing_key.to_bytes())).await?;
        info!("generated new node key in {}", dir.display());

        signing_key
    };

    let pubkey = hex::encode(signing_key.verifying_key().to_bytes());
    tokio::fs::write(dir.join(PUBLIC_KEY_FILE), &pubkey)
        .await
        .map_err(|e| Error::Io("failed to write node public key", e))?;

    Ok(pubkey)
}

async fn write_private_key(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::Io("failed to write node key", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::Io("failed to restrict node key permissions", e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();

        let first = ensure_node_key(dir.path()).await.unwrap();
        let second = ensure_node_key(dir.path()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE)).unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn test_malformed_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PRIVATE_KEY_FILE), "not-hex").unwrap();

        let result = ensure_node_key(dir.path()).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
