//! Internal root CA and per-agent leaf certificate issuance.
//!
//! Grounded in the reference deployment's certificate generator: a 10-year
//! self-signed root (`O=Aegis Platform`, `CN=Aegis Root CA`), and 1-year
//! leaf certs keyed by the agent's UUID (`CN=<agent_id>`), `ClientAuth`
//! EKU only (never `KeyCertSign`), with the leaf's SKI and an AKI chained
//! to the root's SKI.

use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const ROOT_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("rcgen error: {0}")]
    Rcgen(#[from] rcgen::Error),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// A certificate + private key pair issued to one agent, plus the root's
/// public certificate so the agent can validate peers it talks to.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub client_cert_pem: String,
    pub client_key_pem: String,
    pub ca_cert_pem: String,
}

/// The internal root CA. Generated once and persisted to `<data_dir>/ca/`;
/// every subsequent process start loads the same root so previously issued
/// leaf certs remain valid.
pub struct RootCa {
    cert: rcgen::Certificate,
    key_pair: KeyPair,
    pub cert_pem: String,
}

impl RootCa {
    /// Loads the root CA from `data_dir` if present, else generates and
    /// persists a fresh one.
    pub fn load_or_create(data_dir: &Path) -> Result<Self, CaError> {
        let cert_path = data_dir.join("ca.crt");
        let key_path = data_dir.join("ca.key");

        if cert_path.exists() && key_path.exists() {
            let cert_pem = std::fs::read_to_string(&cert_path).map_err(|e| CaError::Io { path: cert_path.clone(), source: e })?;
            let key_pem = std::fs::read_to_string(&key_path).map_err(|e| CaError::Io { path: key_path.clone(), source: e })?;
            let key_pair = KeyPair::from_pem(&key_pem)?;
            let params = CertificateParams::from_ca_cert_pem(&cert_pem)?;
            let cert = params.self_signed(&key_pair)?;
            return Ok(Self { cert_pem, key_pair, cert });
        }

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "Aegis Platform");
        dn.push(DnType::CommonName, "Aegis Root CA");

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(ROOT_VALIDITY_DAYS);

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;
        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();

        std::fs::create_dir_all(data_dir).map_err(|e| CaError::Io { path: data_dir.to_path_buf(), source: e })?;
        std::fs::write(&cert_path, &cert_pem).map_err(|e| CaError::Io { path: cert_path.clone(), source: e })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).ok();
        }
        std::fs::write(&key_path, &key_pem).map_err(|e| CaError::Io { path: key_path.clone(), source: e })?;

        Ok(Self { cert_pem, key_pair, cert })
    }

    /// Issues a 1-year `ClientAuth` leaf certificate for `agent_id`.
    pub fn issue_leaf(&self, agent_id: Uuid) -> Result<IssuedCertificate, CaError> {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "Aegis Platform");
        dn.push(DnType::OrganizationalUnitName, "Agents");
        dn.push(DnType::CommonName, agent_id.to_string());

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);

        let leaf_key = KeyPair::generate()?;
        let leaf_cert = params.signed_by(&leaf_key, &self.cert, &self.key_pair)?;

        Ok(IssuedCertificate {
            client_cert_pem: leaf_cert.pem(),
            client_key_pem: leaf_key.serialize_pem(),
            ca_cert_pem: self.cert_pem.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_leaf_chained_to_root() {
        let dir = tempdir();
        let ca = RootCa::load_or_create(&dir).unwrap();
        let issued = ca.issue_leaf(Uuid::new_v4()).unwrap();
        assert!(issued.client_cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.client_key_pem.contains("BEGIN"));
        assert_eq!(issued.ca_cert_pem, ca.cert_pem);
    }

    #[test]
    fn reloading_root_preserves_identity() {
        let dir = tempdir();
        let first = RootCa::load_or_create(&dir).unwrap();
        let second = RootCa::load_or_create(&dir).unwrap();
        assert_eq!(first.cert_pem, second.cert_pem);
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("aegis-ca-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
