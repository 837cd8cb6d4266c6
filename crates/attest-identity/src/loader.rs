//! Load a signing key and certificate from PKCS12 or PEM files
//!
//! Java KeyStore files are sniffed by magic bytes before anything else,
//! since a JKS file renamed to `.p12` would otherwise reach the PKCS12
//! parser. The caller's password buffer is zeroed before returning.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroize;

use crate::certificate::SigningCertificate;
use crate::error::{IdentityError, Result};
use crate::keys::{is_private_key_label, CertPrivateKey};

/// Java KeyStore magic bytes
pub const JKS_MAGIC: [u8; 4] = [0xFE, 0xED, 0xFE, 0xED];

/// A certificate together with its private key
#[derive(Debug)]
pub struct SigningIdentity {
    pub private_key: CertPrivateKey,
    pub certificate: SigningCertificate,
}

impl SigningIdentity {
    /// Pair a key with a certificate, checking that they belong together
    pub fn new(private_key: CertPrivateKey, certificate: SigningCertificate) -> Result<Self> {
        if private_key.public_key() != certificate.public_key()? {
            return Err(IdentityError::KeyMismatch);
        }
        Ok(Self {
            private_key,
            certificate,
        })
    }

    pub fn cert_hash(&self) -> String {
        self.certificate.cert_hash()
    }
}

/// Container format, by magic bytes then extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    JavaKeyStore,
    Pkcs12,
    Pem,
}

/// Detect the container format of a file's contents
pub fn detect_format(path: &Path, data: &[u8]) -> Result<ContainerFormat> {
    if data.starts_with(&JKS_MAGIC) {
        return Ok(ContainerFormat::JavaKeyStore);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "p12" | "pfx" => Ok(ContainerFormat::Pkcs12),
        "pem" | "crt" | "cer" => Ok(ContainerFormat::Pem),
        _ => Err(IdentityError::UnsupportedFileType(path.display().to_string())),
    }
}

/// Load a signing identity from a certificate container
///
/// `password` is required for PKCS12 files. Whatever the outcome, the
/// buffer holds only zero bytes when this returns.
pub fn load_signing_identity(path: &Path, password: Option<&mut [u8]>) -> Result<SigningIdentity> {
    let result = load_inner(path, password.as_deref());
    if let Some(password) = password {
        password.zeroize();
    }
    result
}

fn load_inner(path: &Path, password: Option<&[u8]>) -> Result<SigningIdentity> {
    let data = std::fs::read(path)?;

    match detect_format(path, &data)? {
        ContainerFormat::JavaKeyStore => {
            info!("Java KeyStore detected at {}", path.display());
            Err(IdentityError::JavaKeyStore {
                path: path.to_path_buf(),
            })
        }
        ContainerFormat::Pkcs12 => {
            let password =
                password.ok_or_else(|| IdentityError::MissingPassword(path.display().to_string()))?;
            debug!("Loading PKCS12 container {}", path.display());
            load_pkcs12(&data, password)
        }
        ContainerFormat::Pem => {
            debug!("Loading PEM/DER certificate {}", path.display());
            load_pem(path, &data)
        }
    }
}

fn load_pkcs12(data: &[u8], password: &[u8]) -> Result<SigningIdentity> {
    let password = std::str::from_utf8(password)
        .map_err(|_| IdentityError::Pkcs12("password is not valid UTF-8".to_string()))?;

    let store = p12_keystore::KeyStore::from_pkcs12(data, password)
        .map_err(|e| IdentityError::Pkcs12(e.to_string()))?;

    let (alias, chain) = store
        .private_key_chain()
        .ok_or_else(|| IdentityError::PrivateKeyNotFound("PKCS12 file has no key entry".to_string()))?;
    debug!("Using PKCS12 entry '{}'", alias);

    let private_key = CertPrivateKey::from_pkcs8_der(chain.key())?;
    let public_key = private_key.public_key();

    // The leaf is normally first, but match on the key rather than trust order
    let mut certificates = chain
        .chain()
        .iter()
        .map(|cert| SigningCertificate::from_der(cert.as_der()))
        .collect::<Result<Vec<_>>>()?;
    if certificates.is_empty() {
        return Err(IdentityError::CertificateNotFound(
            "PKCS12 key entry has no certificate".to_string(),
        ));
    }

    let position = certificates
        .iter()
        .position(|cert| cert.public_key().map(|k| k == public_key).unwrap_or(false))
        .ok_or(IdentityError::KeyMismatch)?;
    let certificate = certificates.swap_remove(position);

    Ok(SigningIdentity {
        private_key,
        certificate,
    })
}

fn load_pem(path: &Path, data: &[u8]) -> Result<SigningIdentity> {
    let blocks = pem_blocks(data)?;

    let certificate = first_certificate(path, data, &blocks)?;

    let private_key = match blocks.iter().find(|(label, _)| is_private_key_label(label)) {
        Some((label, der)) => CertPrivateKey::from_pem_block(label, der)?,
        None => {
            let key_path = find_key_file(path).ok_or_else(|| {
                IdentityError::PrivateKeyNotFound(format!(
                    "no key inside {} and none of {} exist",
                    path.display(),
                    key_file_candidates(path)
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;
            debug!("Using private key {}", key_path.display());
            read_private_key(&key_path)?
        }
    };

    SigningIdentity::new(private_key, certificate)
}

/// Load an explicit certificate and private key pair
pub fn load_pem_pair(cert_path: &Path, key_path: &Path) -> Result<SigningIdentity> {
    let data = std::fs::read(cert_path)?;
    if data.starts_with(&JKS_MAGIC) {
        return Err(IdentityError::JavaKeyStore {
            path: cert_path.to_path_buf(),
        });
    }

    let blocks = pem_blocks(&data)?;
    let certificate = first_certificate(cert_path, &data, &blocks)?;

    SigningIdentity::new(read_private_key(key_path)?, certificate)
}

/// Load just a certificate (PEM or DER), for verifying proofs
pub fn load_certificate(path: &Path) -> Result<SigningCertificate> {
    let data = std::fs::read(path)?;
    if data.starts_with(&JKS_MAGIC) {
        return Err(IdentityError::JavaKeyStore {
            path: path.to_path_buf(),
        });
    }

    let blocks = pem_blocks(&data)?;
    first_certificate(path, &data, &blocks)
}

fn first_certificate(
    path: &Path,
    data: &[u8],
    blocks: &[(String, Vec<u8>)],
) -> Result<SigningCertificate> {
    match blocks.iter().find(|(label, _)| label == "CERTIFICATE") {
        Some((_, der)) => SigningCertificate::from_der(der),
        // .crt and .cer files are often plain DER
        None if blocks.is_empty() => SigningCertificate::from_der(data),
        None => Err(IdentityError::CertificateNotFound(path.display().to_string())),
    }
}

fn read_private_key(path: &Path) -> Result<CertPrivateKey> {
    let data = std::fs::read(path)?;
    let blocks = pem_blocks(&data)?;

    match blocks.iter().find(|(label, _)| is_private_key_label(label)) {
        Some((label, der)) => CertPrivateKey::from_pem_block(label, der),
        None if blocks.is_empty() => CertPrivateKey::from_pkcs8_der(&data),
        None => Err(IdentityError::PrivateKeyNotFound(path.display().to_string())),
    }
}

/// Sibling files searched for a PEM certificate's key, in order
pub fn key_file_candidates(cert_path: &Path) -> Vec<PathBuf> {
    let stem = cert_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = cert_path.parent().unwrap_or_else(|| Path::new(""));

    vec![
        dir.join(format!("{}.key", stem)),
        dir.join(format!("{}-key.pem", stem)),
        dir.join(format!("{}.key.pem", stem)),
    ]
}

fn find_key_file(cert_path: &Path) -> Option<PathBuf> {
    key_file_candidates(cert_path)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Decode every PEM block in a file; empty when the data is not PEM
fn pem_blocks(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    // DER certificates and keys are binary
    if std::str::from_utf8(data).is_err() {
        return Ok(Vec::new());
    }

    let blocks = pem::parse_many(data)
        .map_err(|e| IdentityError::InvalidCertificate(format!("invalid PEM: {}", e)))?;
    Ok(blocks
        .into_iter()
        .map(|block| (block.tag().to_string(), block.into_contents()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureKeyType};

    fn password(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    #[test]
    fn test_pkcs12_all_key_types() {
        let dir = tempfile::tempdir().unwrap();
        for key_type in FixtureKeyType::ALL {
            let fixture = testing::fixture(key_type);
            let path = fixture.write_pkcs12(dir.path(), &format!("{:?}.p12", key_type), "hunter2");

            let mut pw = password("hunter2");
            let identity = load_signing_identity(&path, Some(&mut pw)).unwrap();
            assert_eq!(identity.certificate.der(), fixture.cert_der.as_slice());
            assert!(pw.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_pkcs12_wrong_password_zeroes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let path = fixture.write_pkcs12(dir.path(), "release.pfx", "correct");

        let mut pw = password("incorrect");
        assert!(load_signing_identity(&path, Some(&mut pw)).is_err());
        assert!(pw.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pkcs12_requires_password() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let path = fixture.write_pkcs12(dir.path(), "release.p12", "pw");

        assert!(matches!(
            load_signing_identity(&path, None),
            Err(IdentityError::MissingPassword(_))
        ));
    }

    #[test]
    fn test_jks_rejected_for_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["release.jks", "release.p12", "release.pem", "release.bin"] {
            let path = dir.path().join(name);
            std::fs::write(&path, [0xFE, 0xED, 0xFE, 0xED, 0x00, 0x00, 0x00, 0x02]).unwrap();

            let mut pw = password("changeit");
            let err = load_signing_identity(&path, Some(&mut pw)).unwrap_err();
            assert!(matches!(err, IdentityError::JavaKeyStore { .. }), "{}", name);
            assert!(err.conversion_command().unwrap().contains("-deststoretype PKCS12"));
            assert!(pw.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(matches!(
            load_signing_identity(&path, None),
            Err(IdentityError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_pem_with_sibling_key_files() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        for key_name in ["signing.key", "signing-key.pem", "signing.key.pem"] {
            let dir = tempfile::tempdir().unwrap();
            let cert_path = dir.path().join("signing.pem");
            std::fs::write(&cert_path, fixture.cert_pem()).unwrap();
            std::fs::write(dir.path().join(key_name), fixture.key_pem()).unwrap();

            let identity = load_signing_identity(&cert_path, None).unwrap();
            assert_eq!(identity.cert_hash(), fixture.certificate().cert_hash(), "{}", key_name);
        }
    }

    #[test]
    fn test_combined_pem() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::Ed25519);
        let path = fixture.write_combined_pem(dir.path(), "bundle.pem");

        let identity = load_signing_identity(&path, None).unwrap();
        assert_eq!(identity.private_key.algorithm(), "Ed25519");
    }

    #[test]
    fn test_der_certificate_with_key() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::Rsa);
        let cert_path = dir.path().join("signing.cer");
        std::fs::write(&cert_path, &fixture.cert_der).unwrap();
        std::fs::write(dir.path().join("signing.key"), fixture.key_pem()).unwrap();

        let identity = load_signing_identity(&cert_path, None).unwrap();
        assert_eq!(identity.private_key.algorithm(), "RSA");
    }

    #[test]
    fn test_pem_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let path = dir.path().join("lonely.crt");
        std::fs::write(&path, fixture.cert_pem()).unwrap();

        assert!(matches!(
            load_signing_identity(&path, None),
            Err(IdentityError::PrivateKeyNotFound(_))
        ));
    }

    #[test]
    fn test_mismatched_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cert = testing::fixture(FixtureKeyType::EcdsaP256);
        let other = testing::fixture(FixtureKeyType::EcdsaP256);
        let cert_path = dir.path().join("a.pem");
        let key_path = dir.path().join("b.key");
        std::fs::write(&cert_path, cert.cert_pem()).unwrap();
        std::fs::write(&key_path, other.key_pem()).unwrap();

        assert!(matches!(
            load_pem_pair(&cert_path, &key_path),
            Err(IdentityError::KeyMismatch)
        ));
    }

    #[test]
    fn test_load_certificate_only() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);

        let pem_path = dir.path().join("verify.pem");
        std::fs::write(&pem_path, fixture.cert_pem()).unwrap();
        let der_path = dir.path().join("verify.der");
        std::fs::write(&der_path, &fixture.cert_der).unwrap();
        let key_only = dir.path().join("key-only.pem");
        std::fs::write(&key_only, fixture.key_pem()).unwrap();

        let expected = fixture.certificate().cert_hash();
        assert_eq!(load_certificate(&pem_path).unwrap().cert_hash(), expected);
        assert_eq!(load_certificate(&der_path).unwrap().cert_hash(), expected);
        assert!(matches!(
            load_certificate(&key_only),
            Err(IdentityError::CertificateNotFound(_))
        ));
    }

    #[test]
    fn test_pem_blocks_skip_surrounding_text() {
        let fixture = testing::fixture(FixtureKeyType::EcdsaP256);
        let text = format!(
            "subject=CN=Release\n{}\nissuer notes\n{}",
            fixture.cert_pem(),
            fixture.key_pem()
        );

        let blocks = pem_blocks(text.as_bytes()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, "CERTIFICATE");
        assert_eq!(blocks[0].1, fixture.cert_der);
        assert!(is_private_key_label(&blocks[1].0));

        assert!(pem_blocks(&fixture.cert_der).unwrap().is_empty());
    }

    #[test]
    fn test_key_file_candidates_order() {
        let candidates = key_file_candidates(Path::new("/certs/release.pem"));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/certs/release.key"),
                PathBuf::from("/certs/release-key.pem"),
                PathBuf::from("/certs/release.key.pem"),
            ]
        );
    }
}
