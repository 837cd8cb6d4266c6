#![no_main]

use std::path::Path;

use attest_identity::{detect_format, CertPrivateKey, ContainerFormat, SigningCertificate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // JKS magic wins over every extension
    for name in ["release.p12", "release.pfx", "release.pem", "release.cer", "release.jks"] {
        let format = detect_format(Path::new(name), data);
        if data.starts_with(&[0xFE, 0xED, 0xFE, 0xED]) {
            assert_eq!(format.unwrap(), ContainerFormat::JavaKeyStore);
        }
    }

    // Untrusted DER must never panic the parsers
    if let Ok(certificate) = SigningCertificate::from_der(data) {
        let _ = certificate.public_key();
        let _ = certificate.subject();
        assert_eq!(certificate.cert_hash().len(), 64);
    }
    let _ = CertPrivateKey::from_pkcs8_der(data);
    let _ = CertPrivateKey::from_sec1_der(data);
});
