//! Self-signed certificate authority persistence.
//!
//! Grounded on `internal/signer/cert.go`: a long-lived CA with
//! `KeyUsage = DigitalSignature | CertSign`, persisted to disk so restarts
//! don't churn the trust anchor the operator installed in their browser
//! profile. Per-host leaf minting is delegated to
//! [`hudsucker::certificate_authority::RcgenAuthority`], which implements
//! the same fetch-or-generate-and-cache contract as the original's
//! `lruStorage`.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::fs;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

const CA_COMMON_NAME: &str = "aichat-proxy local MITM CA";
const CA_VALIDITY_YEARS: i64 = 20;
const LEAF_CACHE_SIZE: usize = 4096;

pub struct Authority {
    pub cert_pem: String,
    pub key_pem: String,
}

impl Authority {
    fn cert_path(certs_dir: &Path) -> PathBuf {
        certs_dir.join("ca-cert.pem")
    }

    fn key_path(certs_dir: &Path) -> PathBuf {
        certs_dir.join("ca-key.pem")
    }

    /// Loads a persisted CA from `certs_dir`, or generates and persists a
    /// fresh one if none exists yet.
    pub fn load_or_create(certs_dir: &Path) -> anyhow::Result<Self> {
        let cert_path = Self::cert_path(certs_dir);
        let key_path = Self::key_path(certs_dir);

        if cert_path.exists() && key_path.exists() {
            tracing::debug!(path = %cert_path.display(), "loading existing CA");
            let cert_pem = fs::read_to_string(&cert_path)?;
            let key_pem = fs::read_to_string(&key_path)?;
            return Ok(Self { cert_pem, key_pem });
        }

        tracing::info!("no CA found, generating a new one");
        let authority = Self::generate()?;
        authority.persist(certs_dir)?;
        Ok(authority)
    }

    fn generate() -> anyhow::Result<Self> {
        let key_pair = KeyPair::generate()?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign];
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(365 * CA_VALIDITY_YEARS);

        let cert = params.self_signed(&key_pair)?;

        Ok(Self { cert_pem: cert.pem(), key_pem: key_pair.serialize_pem() })
    }

    fn persist(&self, certs_dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(certs_dir)?;
        let cert_path = Self::cert_path(certs_dir);
        let key_path = Self::key_path(certs_dir);
        fs::write(&cert_path, &self.cert_pem)?;
        fs::write(&key_path, &self.key_pem)?;
        set_owner_only_perms(&cert_path)?;
        set_owner_only_perms(&key_path)?;
        tracing::info!(dir = %certs_dir.display(), "persisted CA");
        Ok(())
    }

    /// Builds the `hudsucker` certificate authority that mints and caches
    /// per-host leaf certificates for the MITM proxy.
    pub fn into_hudsucker(
        &self,
    ) -> anyhow::Result<hudsucker::certificate_authority::RcgenAuthority> {
        let key_pair = KeyPair::from_pem(&self.key_pem)?;
        let ca_cert = CertificateParams::from_ca_cert_pem(&self.cert_pem)?.self_signed(&key_pair)?;
        Ok(hudsucker::certificate_authority::RcgenAuthority::new(
            key_pair,
            ca_cert,
            LEAF_CACHE_SIZE as u64,
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
    }
}

#[cfg(unix)]
fn set_owner_only_perms(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_perms(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_ca_flagged_cert() {
        let authority = Authority::generate().expect("generate CA");
        assert!(authority.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(authority.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn load_or_create_persists_and_reloads_identical_material() {
        let dir = tempfile::tempdir().unwrap();
        let first = Authority::load_or_create(dir.path()).expect("first create");
        let second = Authority::load_or_create(dir.path()).expect("reload");
        assert_eq!(first.cert_pem, second.cert_pem);
        assert_eq!(first.key_pem, second.key_pem);
    }

    #[test]
    fn into_hudsucker_builds_without_error() {
        let authority = Authority::generate().expect("generate CA");
        authority.into_hudsucker().expect("build RcgenAuthority");
    }
}
