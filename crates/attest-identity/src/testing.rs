//! Certificate and key fixtures for tests
//!
//! Every fixture certificate is issued by a throwaway P-256 key; only the
//! subject key varies with the fixture type.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use ed25519_dalek::pkcs8::{EncodePrivateKey as _, EncodePublicKey as _};
use rand::rngs::OsRng;
use rand::RngCore;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::pem::LineEnding;
use x509_cert::der::{Decode, Encode};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

use crate::certificate::SigningCertificate;
use crate::keys::CertPrivateKey;

/// Subject key algorithm of a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKeyType {
    EcdsaP256,
    EcdsaP384,
    Rsa,
    Ed25519,
}

impl FixtureKeyType {
    pub const ALL: [FixtureKeyType; 4] = [
        FixtureKeyType::EcdsaP256,
        FixtureKeyType::EcdsaP384,
        FixtureKeyType::Rsa,
        FixtureKeyType::Ed25519,
    ];
}

/// A certificate with its PKCS#8 private key
#[derive(Debug, Clone)]
pub struct CertificateFixture {
    pub key_type: FixtureKeyType,
    pub cert_der: Vec<u8>,
    pub key_pkcs8_der: Vec<u8>,
}

static RSA_KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();

/// A process-wide RSA key; generating one per test is too slow
pub fn rsa_key() -> rsa::RsaPrivateKey {
    RSA_KEY
        .get_or_init(|| rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA key"))
        .clone()
}

/// Build a fresh fixture
pub fn fixture(key_type: FixtureKeyType) -> CertificateFixture {
    let (key_pkcs8_der, spki_der) = match key_type {
        FixtureKeyType::EcdsaP256 => {
            let key = p256::ecdsa::SigningKey::random(&mut OsRng);
            let public = p256::ecdsa::VerifyingKey::from(&key);
            (
                key.to_pkcs8_der().expect("encode P-256 key").as_bytes().to_vec(),
                public.to_public_key_der().expect("encode P-256 SPKI").as_bytes().to_vec(),
            )
        }
        FixtureKeyType::EcdsaP384 => {
            let key = p384::ecdsa::SigningKey::random(&mut OsRng);
            let public = p384::ecdsa::VerifyingKey::from(&key);
            (
                key.to_pkcs8_der().expect("encode P-384 key").as_bytes().to_vec(),
                public.to_public_key_der().expect("encode P-384 SPKI").as_bytes().to_vec(),
            )
        }
        FixtureKeyType::Rsa => {
            let key = rsa_key();
            (
                key.to_pkcs8_der().expect("encode RSA key").as_bytes().to_vec(),
                key.to_public_key()
                    .to_public_key_der()
                    .expect("encode RSA SPKI")
                    .as_bytes()
                    .to_vec(),
            )
        }
        FixtureKeyType::Ed25519 => {
            let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
            (
                key.to_pkcs8_der().expect("encode Ed25519 key").as_bytes().to_vec(),
                key.verifying_key()
                    .to_public_key_der()
                    .expect("encode Ed25519 SPKI")
                    .as_bytes()
                    .to_vec(),
            )
        }
    };

    CertificateFixture {
        key_type,
        cert_der: issue_certificate(&spki_der, key_type),
        key_pkcs8_der,
    }
}

fn issue_certificate(spki_der: &[u8], key_type: FixtureKeyType) -> Vec<u8> {
    let issuer = p256::ecdsa::SigningKey::random(&mut OsRng);

    let mut serial = [0u8; 8];
    OsRng.fill_bytes(&mut serial[1..]);
    serial[0] = 0x01;

    let subject = Name::from_str(&format!("CN=Attest Test {:?},O=Attest", key_type))
        .expect("subject name");
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der).expect("decode SPKI");
    let validity = Validity::from_now(Duration::from_secs(365 * 24 * 60 * 60)).expect("validity");

    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::new(&serial).expect("serial number"),
        validity,
        subject,
        spki,
        &issuer,
    )
    .expect("certificate builder");

    builder
        .build::<p256::ecdsa::DerSignature>()
        .expect("sign certificate")
        .to_der()
        .expect("encode certificate")
}

impl CertificateFixture {
    pub fn certificate(&self) -> SigningCertificate {
        SigningCertificate::from_der(&self.cert_der).expect("fixture certificate")
    }

    pub fn private_key(&self) -> CertPrivateKey {
        CertPrivateKey::from_pkcs8_der(&self.key_pkcs8_der).expect("fixture private key")
    }

    pub fn cert_pem(&self) -> String {
        x509_cert::der::pem::encode_string("CERTIFICATE", LineEnding::LF, &self.cert_der)
            .expect("encode certificate PEM")
    }

    pub fn key_pem(&self) -> String {
        x509_cert::der::pem::encode_string("PRIVATE KEY", LineEnding::LF, &self.key_pkcs8_der)
            .expect("encode key PEM")
    }

    /// PKCS12 container holding the key and certificate
    pub fn to_pkcs12(&self, password: &str) -> Vec<u8> {
        let certificate =
            p12_keystore::Certificate::from_der(&self.cert_der).expect("PKCS12 certificate");
        let chain = p12_keystore::PrivateKeyChain::new(
            &self.key_pkcs8_der,
            b"attest-fixture",
            vec![certificate],
        );

        let mut store = p12_keystore::KeyStore::new();
        store.add_entry("attest", p12_keystore::KeyStoreEntry::PrivateKeyChain(chain));
        store.writer(password).write().expect("write PKCS12")
    }

    pub fn write_pkcs12(&self, dir: &Path, file_name: &str, password: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.to_pkcs12(password)).expect("write PKCS12 fixture");
        path
    }

    /// Certificate in `<stem>.pem` with the key in `<stem>.key`
    pub fn write_pem_pair(&self, dir: &Path, stem: &str) -> PathBuf {
        let cert_path = dir.join(format!("{}.pem", stem));
        std::fs::write(&cert_path, self.cert_pem()).expect("write certificate");
        std::fs::write(dir.join(format!("{}.key", stem)), self.key_pem()).expect("write key");
        cert_path
    }

    /// Certificate and key in one PEM file
    pub fn write_combined_pem(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, format!("{}{}", self.cert_pem(), self.key_pem()))
            .expect("write combined PEM");
        path
    }
}
