//! Exportable certifications of a chain range.
//!
//! A certification is a self-contained JSON document: a contiguous run of
//! events, the error events recorded against that range, and the signing
//! key's public half. Anyone holding the document and the public key can
//! re-verify the range without access to the store.

use serde::{Deserialize, Serialize};

use sealog_crypto::PublicKey;

use crate::event::{base64_bytes, ErrorEvent, Event};

/// A portable snapshot of a contiguous audit chain range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    /// Nanosecond timestamp at which the certification was built.
    pub when: i64,

    /// The certified events, ascending by serial.
    #[serde(default)]
    pub chain: Vec<Event>,

    /// Error events whose reserved serial falls inside the range.
    #[serde(default)]
    pub errors: Vec<ErrorEvent>,

    /// The signing key's public half, DER SubjectPublicKeyInfo.
    #[serde(with = "base64_bytes")]
    pub public: Vec<u8>,
}

/// Verify a JSON-encoded certification against the signer's public key.
///
/// Checks the internal consistency of the exported range: when the chain
/// opens at serial 0 its first entry is verified against an empty previous
/// signature, and every subsequent entry is verified against its
/// predecessor's signature. A chain that opens at a non-zero serial is
/// accepted and checked for contiguity only - rootedness back to serial 0
/// requires requesting a certification that starts there.
///
/// Returns `None` if the document cannot be decoded or any signature check
/// fails.
#[must_use]
pub fn verify_certification(doc: &[u8], key: &PublicKey) -> Option<Certification> {
    let certification: Certification = serde_json::from_slice(doc).ok()?;

    if let Some(first) = certification.chain.first() {
        if first.serial == 0 && !first.verify(key, &[]) {
            return None;
        }
    }

    for pair in certification.chain.windows(2) {
        if !pair[1].verify(key, &pair[0].signature) {
            return None;
        }
    }

    Some(certification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attribute, Level};
    use sealog_crypto::KeyPair;

    fn chain_of(kp: &KeyPair, len: u64) -> Vec<Event> {
        let mut chain = Vec::new();
        let mut prev: Vec<u8> = Vec::new();
        for serial in 0..len {
            let mut event = Event::draft(
                1_700_000_000_000_000_000 + serial as i64,
                Level::Info,
                "test",
                "ping",
                vec![Attribute::new("n", serial.to_string())],
            );
            event.serial = serial;
            event.received = event.when;
            event.signature = prev.clone();
            event.signature = kp.sign_digest(&event.digest()).unwrap();
            prev = event.signature.clone();
            chain.push(event);
        }
        chain
    }

    fn certification_of(kp: &KeyPair, chain: Vec<Event>) -> Certification {
        Certification {
            when: 1_700_000_000_000_000_000,
            chain,
            errors: Vec::new(),
            public: kp.public_key().to_spki_der().unwrap(),
        }
    }

    #[test]
    fn rooted_chain_verifies() {
        let kp = KeyPair::generate();
        let certification = certification_of(&kp, chain_of(&kp, 4));
        let doc = serde_json::to_vec(&certification).unwrap();

        let verified = verify_certification(&doc, &kp.public_key()).unwrap();
        assert_eq!(verified.chain.len(), 4);
        assert_eq!(verified, certification);
    }

    #[test]
    fn empty_chain_verifies() {
        let kp = KeyPair::generate();
        let certification = certification_of(&kp, Vec::new());
        let doc = serde_json::to_vec(&certification).unwrap();

        assert!(verify_certification(&doc, &kp.public_key()).is_some());
    }

    #[test]
    fn non_rooted_range_checks_contiguity_only() {
        let kp = KeyPair::generate();
        let mut chain = chain_of(&kp, 5);
        let tail: Vec<Event> = chain.split_off(2);
        let certification = certification_of(&kp, tail);
        let doc = serde_json::to_vec(&certification).unwrap();

        assert!(verify_certification(&doc, &kp.public_key()).is_some());
    }

    #[test]
    fn tampered_entry_is_rejected() {
        let kp = KeyPair::generate();
        let mut chain = chain_of(&kp, 3);
        chain[1].actor = "intruder".into();
        let certification = certification_of(&kp, chain);
        let doc = serde_json::to_vec(&certification).unwrap();

        assert!(verify_certification(&doc, &kp.public_key()).is_none());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let kp = KeyPair::generate();
        let certification = certification_of(&kp, chain_of(&kp, 2));
        let doc = serde_json::to_vec(&certification).unwrap();

        let other = KeyPair::generate();
        assert!(verify_certification(&doc, &other.public_key()).is_none());
    }

    #[test]
    fn garbage_document_is_rejected() {
        let kp = KeyPair::generate();
        assert!(verify_certification(b"not json", &kp.public_key()).is_none());
    }

    #[test]
    fn pretty_printed_document_roundtrips() {
        let kp = KeyPair::generate();
        let certification = certification_of(&kp, chain_of(&kp, 3));

        let pretty = serde_json::to_string_pretty(&certification).unwrap();
        let reparsed = verify_certification(pretty.as_bytes(), &kp.public_key()).unwrap();
        assert_eq!(reparsed, certification);
    }
}
