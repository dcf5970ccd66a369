//! Local agent identity: a self-generated API key and the UUID Core
//! assigns on first registration, both persisted to disk so a restart
//! reuses the same identity instead of re-enrolling. Mirrors the
//! reference agent's `agent_id.py` / `_load_or_generate_api_key`, merged
//! into one struct since both files live under the same data directory.

use std::path::{Path, PathBuf};

use rand::RngCore;
use uuid::Uuid;

use crate::error::Result;

pub struct LocalIdentity {
    pub api_key: String,
    pub agent_id: Option<Uuid>,
    agent_id_path: PathBuf,
}

impl LocalIdentity {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let api_key_path = data_dir.join(".agent_api_key");
        let agent_id_path = data_dir.join(".agent_id");

        let api_key = if api_key_path.exists() {
            std::fs::read_to_string(&api_key_path)?.trim().to_string()
        } else {
            let key = generate_api_key();
            std::fs::write(&api_key_path, &key)?;
            set_owner_only(&api_key_path);
            key
        };

        let agent_id = if agent_id_path.exists() {
            std::fs::read_to_string(&agent_id_path).ok().and_then(|s| s.trim().parse::<Uuid>().ok())
        } else {
            None
        };

        Ok(Self { api_key, agent_id, agent_id_path })
    }

    pub fn set_agent_id(&mut self, id: Uuid) -> Result<()> {
        self.agent_id = Some(id);
        std::fs::write(&self.agent_id_path, id.to_string())?;
        set_owner_only(&self.agent_id_path);
        Ok(())
    }
}

/// Persists the cert triple a registration call returns so mTLS survives
/// a restart without contacting Core again.
pub fn persist_certificate(data_dir: &Path, client_cert_pem: &str, client_key_pem: &str, ca_cert_pem: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(data_dir.join("client.crt"), client_cert_pem)?;
    let key_path = data_dir.join("client.key");
    std::fs::write(&key_path, client_key_pem)?;
    set_owner_only(&key_path);
    std::fs::write(data_dir.join("ca.crt"), ca_cert_pem)?;
    Ok(())
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_persists_identity_across_reloads() {
        let dir = std::env::temp_dir().join(format!("aegis-striker-state-test-{}", Uuid::new_v4()));
        let first = LocalIdentity::load_or_create(&dir).unwrap();
        assert!(first.agent_id.is_none());

        let mut second = LocalIdentity::load_or_create(&dir).unwrap();
        assert_eq!(first.api_key, second.api_key);

        let id = Uuid::new_v4();
        second.set_agent_id(id).unwrap();
        let third = LocalIdentity::load_or_create(&dir).unwrap();
        assert_eq!(third.agent_id, Some(id));

        std::fs::remove_dir_all(&dir).ok();
    }
}
