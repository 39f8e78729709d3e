//! X.509 chain checks for the `x5c` header of App Store payloads.
//!
//! The chain is leaf first. Each certificate must be issued and signed by the
//! next one, every issuer must be a CA, all certificates must be inside their
//! validity period, and the last entry must be the pinned root.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

use crate::domain::billing::VerificationError;

/// Minimum chain length: leaf plus root.
const MIN_CHAIN_LEN: usize = 2;

/// Trust anchor identified by the SHA-256 of its DER encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedRoot {
    fingerprint: String,
}

impl PinnedRoot {
    /// `fingerprint` is hex encoded. Colons and case are ignored.
    pub fn new(fingerprint: &str) -> Self {
        Self {
            fingerprint: normalize_fingerprint(fingerprint),
        }
    }

    pub fn matches(&self, der: &[u8]) -> bool {
        sha256_hex(der) == self.fingerprint
    }

    /// Verifies a base64 `x5c` chain and returns the leaf's public key
    /// (an uncompressed EC point for App Store certificates).
    pub fn verify_chain(&self, x5c: &[String]) -> Result<Vec<u8>, VerificationError> {
        if x5c.len() < MIN_CHAIN_LEN {
            return Err(VerificationError::signature("Missing certificate chain"));
        }

        let ders = x5c
            .iter()
            .map(|entry| STANDARD.decode(entry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VerificationError::malformed(format!("Invalid certificate encoding: {}", e)))?;

        match ders.last() {
            Some(root) if self.matches(root) => {}
            _ => {
                return Err(VerificationError::signature(
                    "Certificate chain does not end at the pinned root",
                ))
            }
        }

        let certs = ders
            .iter()
            .map(|der| parse(der))
            .collect::<Result<Vec<_>, _>>()?;

        if certs.iter().any(|cert| !cert.validity().is_valid()) {
            return Err(VerificationError::signature(
                "Certificate outside its validity period",
            ));
        }

        for pair in certs.windows(2) {
            let (child, issuer) = (&pair[0], &pair[1]);
            if !issuer.is_ca() {
                return Err(VerificationError::signature(
                    "Issuing certificate is not a CA",
                ));
            }
            if child.issuer().as_raw() != issuer.subject().as_raw() {
                return Err(VerificationError::signature(
                    "Certificate not issued by the next chain entry",
                ));
            }
            child
                .verify_signature(Some(issuer.public_key()))
                .map_err(|e| {
                    VerificationError::signature(format!(
                        "Certificate chain signature invalid: {}",
                        e
                    ))
                })?;
        }

        let (leaf, root) = match (certs.first(), certs.last()) {
            (Some(leaf), Some(root)) => (leaf, root),
            _ => return Err(VerificationError::signature("Missing certificate chain")),
        };
        root.verify_signature(None).map_err(|e| {
            VerificationError::signature(format!("Root certificate signature invalid: {}", e))
        })?;

        Ok(leaf.public_key().subject_public_key.data.to_vec())
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, VerificationError> {
    let (rest, cert) = parse_x509_certificate(der)
        .map_err(|e| VerificationError::malformed(format!("Invalid certificate: {}", e)))?;
    if !rest.is_empty() {
        return Err(VerificationError::malformed(
            "Trailing data after certificate",
        ));
    }
    Ok(cert)
}

fn normalize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::app_store::fixtures::PKI;

    fn encode(ders: &[&[u8]]) -> Vec<String> {
        ders.iter().map(|der| STANDARD.encode(der)).collect()
    }

    fn pinned() -> PinnedRoot {
        PinnedRoot::new(&PKI.root_fingerprint())
    }

    #[test]
    fn full_chain_returns_leaf_key() {
        let key = pinned().verify_chain(&PKI.chain()).unwrap();
        assert_eq!(key, PKI.leaf_point());
    }

    #[test]
    fn leaf_from_lookalike_issuer_fails_signature_check() {
        let chain = encode(&[
            PKI.forged_leaf.as_slice(),
            PKI.intermediate.as_slice(),
            PKI.root.as_slice(),
        ]);

        let err = pinned().verify_chain(&chain).unwrap_err();

        assert!(
            matches!(&err, VerificationError::SignatureInvalid(msg) if msg.starts_with("Certificate chain signature invalid")),
            "{:?}",
            err
        );
    }

    #[test]
    fn leaf_placed_directly_under_root_is_rejected() {
        let chain = encode(&[PKI.forged_leaf.as_slice(), PKI.root.as_slice()]);

        let err = pinned().verify_chain(&chain).unwrap_err();

        assert_eq!(
            err,
            VerificationError::signature("Certificate not issued by the next chain entry")
        );
    }

    #[test]
    fn end_entity_cannot_issue() {
        let chain = encode(&[
            PKI.leaf.as_slice(),
            PKI.other_leaf.as_slice(),
            PKI.intermediate.as_slice(),
            PKI.root.as_slice(),
        ]);

        let err = pinned().verify_chain(&chain).unwrap_err();

        assert_eq!(err, VerificationError::signature("Issuing certificate is not a CA"));
    }

    #[test]
    fn unpinned_root_is_rejected() {
        let err = PinnedRoot::new(&"00".repeat(32))
            .verify_chain(&PKI.chain())
            .unwrap_err();

        assert_eq!(
            err,
            VerificationError::signature("Certificate chain does not end at the pinned root")
        );
    }

    #[test]
    fn single_certificate_is_not_a_chain() {
        let err = pinned().verify_chain(&encode(&[PKI.root.as_slice()])).unwrap_err();
        assert_eq!(err, VerificationError::signature("Missing certificate chain"));
    }

    #[test]
    fn garbage_certificate_is_malformed() {
        let root = PinnedRoot::new(&sha256_hex(b"not a certificate"));
        let chain = encode(&[&b"not a leaf"[..], &b"not a certificate"[..]]);

        let err = root.verify_chain(&chain).unwrap_err();
        assert!(matches!(err, VerificationError::MalformedPayload(_)));
    }

    #[test]
    fn fingerprint_ignores_colons_and_case() {
        assert_eq!(normalize_fingerprint("AB:cd:EF"), "abcdef");
        assert!(PinnedRoot::new(&PKI.root_fingerprint().to_uppercase()).matches(&PKI.root));
    }
}
