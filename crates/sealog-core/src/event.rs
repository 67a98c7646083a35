//! Audit events and their canonical digest.
//!
//! Every committed event is chain-linked: the signature of the previous
//! event is folded into the digest of the next, so the curve signature
//! simultaneously authenticates the event and its position in the chain.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sealog_crypto::PublicKey;

/// Severity of an audit event.
///
/// Stored and serialised as its upper-case label. Text that does not match
/// a known label normalises to [`Level::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    /// Internal diagnostics of the audit logger itself.
    Debug,
    /// Expected, routine events.
    Info,
    /// Urgent but non-error events.
    Warning,
    /// Error events, e.g. an authentication failure.
    Error,
    /// Critical failures, almost always followed by a shutdown.
    Critical,
    /// Unrecognised level text.
    #[serde(other)]
    Unknown,
}

impl Level {
    /// The canonical upper-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a stored label, normalising unknown text to [`Level::Unknown`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARNING" => Self::Warning,
            "ERROR" => Self::Error,
            "CRITICAL" => Self::Critical,
            _ => Self::Unknown,
        }
    }

    /// Whether the level belongs on the informational stream (DEBUG, INFO)
    /// rather than the error stream.
    #[must_use]
    pub const fn is_routine(&self) -> bool {
        matches!(self, Self::Debug | Self::Info)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An additional detail attached to an event.
///
/// Attribute order is part of the signed record: the same pairs in a
/// different order produce a different digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name, e.g. `user`.
    #[serde(rename = "Name")]
    pub name: String,
    /// Attribute value, e.g. `root`.
    #[serde(rename = "Value")]
    pub value: String,
}

impl Attribute {
    /// Create an attribute pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One record in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The event's position in the audit chain. Committed serials are dense:
    /// `0, 1, …, N-1`.
    #[serde(rename = "Serial")]
    pub serial: u64,

    /// Nanosecond timestamp recording when the event was raised.
    #[serde(rename = "When")]
    pub when: i64,

    /// Nanosecond timestamp recording when the engine serialised the event.
    /// Normally `received >= when`, but clock skew is never enforced.
    #[serde(rename = "Received")]
    pub received: i64,

    /// Severity label.
    #[serde(rename = "Level")]
    pub level: Level,

    /// The component that reported the event.
    #[serde(rename = "Actor")]
    pub actor: String,

    /// Short text description of what occurred.
    #[serde(rename = "Event")]
    pub event: String,

    /// Ordered additional details.
    #[serde(rename = "Attributes", default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,

    /// ASN.1 DER ECDSA signature over the event digest. The digest covers
    /// every other field plus the previous event's signature, so this value
    /// also pins the event's position in the chain.
    #[serde(
        rename = "Signature",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub signature: Vec<u8>,
}

impl Event {
    /// An unsigned draft. `serial`, `received` and `signature` are assigned
    /// by the engine during serialisation.
    #[must_use]
    pub fn draft(
        when: i64,
        level: Level,
        actor: impl Into<String>,
        event: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> Self {
        Self {
            serial: 0,
            when,
            received: 0,
            level,
            actor: actor.into(),
            event: event.into(),
            attributes,
            signature: Vec::new(),
        }
    }

    /// SHA-256 over the canonical field concatenation, with `link` standing
    /// in for the signature field.
    ///
    /// The order is load-bearing and frozen under test: serial, when and
    /// received as signed 64-bit big-endian integers; then the UTF-8 bytes
    /// of level, actor and event; then each attribute's name and value in
    /// declared order; finally the link bytes (an empty link appends
    /// nothing).
    fn digest_with(&self, link: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.serial as i64).to_be_bytes());
        hasher.update(self.when.to_be_bytes());
        hasher.update(self.received.to_be_bytes());
        hasher.update(self.level.as_str().as_bytes());
        hasher.update(self.actor.as_bytes());
        hasher.update(self.event.as_bytes());
        for attribute in &self.attributes {
            hasher.update(attribute.name.as_bytes());
            hasher.update(attribute.value.as_bytes());
        }
        if !link.is_empty() {
            hasher.update(link);
        }
        hasher.finalize().into()
    }

    /// The digest over the current field contents.
    ///
    /// During signing the engine stores the *previous* event's signature in
    /// the signature field first, so this digest binds the event to the
    /// chain tail.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        self.digest_with(&self.signature)
    }

    /// Check the signature on the event. `prev` is the previous event's
    /// signature (empty for the first event in a chain).
    ///
    /// Returns `false` on any decode or curve failure; never panics.
    #[must_use]
    pub fn verify(&self, key: &PublicKey, prev: &[u8]) -> bool {
        let digest = self.digest_with(prev);
        key.verify_digest(&digest, &self.signature)
    }
}

impl std::fmt::Display for Event {
    /// The human-readable sink line:
    /// `<RFC3339 when> [<LEVEL>] <actor>:<event>[ name=value]*`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let when = DateTime::from_timestamp_nanos(self.when);
        write!(
            f,
            "{} [{}] {}:{}",
            when.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.level,
            self.actor,
            self.event
        )?;
        for attribute in &self.attributes {
            write!(f, " {}={}", attribute.name, attribute.value)?;
        }
        Ok(())
    }
}

/// A forensic record of a failed attempt to commit an event.
///
/// The embedded event carries the serial that was tentatively reserved and
/// then released; its signature is empty. Error events live outside the
/// signed chain and never consume a serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Nanosecond timestamp at which the failure was recorded.
    pub when: i64,

    /// Human-readable cause, prefixed by the failure stage
    /// (`signature:`, `marshal signature:` or `store:`).
    pub message: String,

    /// The event that would have been committed.
    pub event: Event,
}

/// Serde adapter: byte fields as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealog_crypto::KeyPair;

    fn sample_event() -> Event {
        Event {
            serial: 3,
            when: 1_700_000_000_000_000_001,
            received: 1_700_000_000_000_000_002,
            level: Level::Warning,
            actor: "gatekeeper".into(),
            event: "login".into(),
            attributes: vec![
                Attribute::new("user", "root"),
                Attribute::new("tty", "pts/0"),
            ],
            signature: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    fn signed(kp: &KeyPair, serial: u64, prev: &[u8]) -> Event {
        let mut event = Event::draft(
            1_700_000_000_000_000_000 + serial as i64,
            Level::Info,
            "test",
            "ping",
            vec![Attribute::new("n", serial.to_string())],
        );
        event.serial = serial;
        event.received = event.when + 1;
        event.signature = prev.to_vec();
        let signature = kp.sign_digest(&event.digest()).unwrap();
        event.signature = signature;
        event
    }

    #[test]
    fn digest_field_order_is_frozen() {
        let event = sample_event();

        // The canonical preimage, assembled by hand in the documented order.
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&3i64.to_be_bytes());
        preimage.extend_from_slice(&1_700_000_000_000_000_001i64.to_be_bytes());
        preimage.extend_from_slice(&1_700_000_000_000_000_002i64.to_be_bytes());
        preimage.extend_from_slice(b"WARNING");
        preimage.extend_from_slice(b"gatekeeper");
        preimage.extend_from_slice(b"login");
        preimage.extend_from_slice(b"user");
        preimage.extend_from_slice(b"root");
        preimage.extend_from_slice(b"tty");
        preimage.extend_from_slice(b"pts/0");
        preimage.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let expected: [u8; 32] = Sha256::digest(&preimage).into();
        assert_eq!(event.digest(), expected);
    }

    #[test]
    fn empty_signature_appends_nothing() {
        let mut event = sample_event();
        event.signature.clear();

        let mut preimage = Vec::new();
        preimage.extend_from_slice(&3i64.to_be_bytes());
        preimage.extend_from_slice(&1_700_000_000_000_000_001i64.to_be_bytes());
        preimage.extend_from_slice(&1_700_000_000_000_000_002i64.to_be_bytes());
        preimage.extend_from_slice(b"WARNING");
        preimage.extend_from_slice(b"gatekeeper");
        preimage.extend_from_slice(b"login");
        preimage.extend_from_slice(b"user");
        preimage.extend_from_slice(b"root");
        preimage.extend_from_slice(b"tty");
        preimage.extend_from_slice(b"pts/0");

        let expected: [u8; 32] = Sha256::digest(&preimage).into();
        assert_eq!(event.digest(), expected);
    }

    #[test]
    fn verify_accepts_signed_event() {
        let kp = KeyPair::generate();
        let event = signed(&kp, 0, &[]);
        assert!(event.verify(&kp.public_key(), &[]));
    }

    #[test]
    fn verify_links_to_previous_signature() {
        let kp = KeyPair::generate();
        let first = signed(&kp, 0, &[]);
        let second = signed(&kp, 1, &first.signature);

        assert!(second.verify(&kp.public_key(), &first.signature));
        // The wrong link breaks verification.
        assert!(!second.verify(&kp.public_key(), &[]));
        assert!(!second.verify(&kp.public_key(), &second.signature));
    }

    #[test]
    fn mutating_any_signed_field_breaks_verification() {
        let kp = KeyPair::generate();
        let public = kp.public_key();
        let prev = signed(&kp, 0, &[]);
        let event = signed(&kp, 1, &prev.signature);
        assert!(event.verify(&public, &prev.signature));

        let mutations: Vec<Box<dyn Fn(&mut Event)>> = vec![
            Box::new(|e| e.serial += 1),
            Box::new(|e| e.when += 1),
            Box::new(|e| e.received -= 1),
            Box::new(|e| e.level = Level::Critical),
            Box::new(|e| e.actor.push('x')),
            Box::new(|e| e.event = "pong".into()),
            Box::new(|e| e.attributes[0].name = "m".into()),
            Box::new(|e| e.attributes[0].value = "0".into()),
            Box::new(|e| e.attributes.clear()),
        ];

        for (i, mutate) in mutations.iter().enumerate() {
            let mut tampered = event.clone();
            mutate(&mut tampered);
            assert!(
                !tampered.verify(&public, &prev.signature),
                "mutation {i} went undetected"
            );
        }
    }

    #[test]
    fn attribute_order_is_signed() {
        let kp = KeyPair::generate();
        let mut event = Event::draft(
            1_700_000_000_000_000_000,
            Level::Info,
            "test",
            "swap",
            vec![Attribute::new("a", "1"), Attribute::new("b", "2")],
        );
        event.signature = kp.sign_digest(&event.digest()).unwrap();
        assert!(event.verify(&kp.public_key(), &[]));

        event.attributes.swap(0, 1);
        assert!(!event.verify(&kp.public_key(), &[]));
    }

    #[test]
    fn duplicate_attribute_names_are_distinct() {
        let kp = KeyPair::generate();
        let mut event = Event::draft(
            1_700_000_000_000_000_000,
            Level::Info,
            "test",
            "dup",
            vec![Attribute::new("k", "1"), Attribute::new("k", "2")],
        );
        event.signature = kp.sign_digest(&event.digest()).unwrap();
        assert!(event.verify(&kp.public_key(), &[]));

        event.attributes.pop();
        assert!(!event.verify(&kp.public_key(), &[]));
    }

    #[test]
    fn level_labels_roundtrip() {
        for level in [
            Level::Debug,
            Level::Info,
            Level::Warning,
            Level::Error,
            Level::Critical,
            Level::Unknown,
        ] {
            assert_eq!(Level::from_label(level.as_str()), level);
        }
        assert_eq!(Level::from_label("NOTICE"), Level::Unknown);
    }

    #[test]
    fn unknown_level_text_normalises_in_json() {
        let level: Level = serde_json::from_str("\"NOTICE\"").unwrap();
        assert_eq!(level, Level::Unknown);
        assert_eq!(serde_json::to_string(&level).unwrap(), "\"UNKNOWN\"");
    }

    #[test]
    fn display_line_format() {
        let mut event = sample_event();
        event.when = 0;
        assert_eq!(
            event.to_string(),
            "1970-01-01T00:00:00Z [WARNING] gatekeeper:login user=root tty=pts/0"
        );
    }

    #[test]
    fn json_field_names_match_export_format() {
        let event = sample_event();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["Serial"], 3);
        assert_eq!(value["Level"], "WARNING");
        assert_eq!(value["Actor"], "gatekeeper");
        assert_eq!(value["Attributes"][0]["Name"], "user");
        assert_eq!(value["Signature"], "3q2+7w==");

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn absent_attributes_deserialise_empty() {
        let event: Event = serde_json::from_str(
            r#"{"Serial":0,"When":1,"Received":2,"Level":"INFO","Actor":"a","Event":"e"}"#,
        )
        .unwrap();
        assert!(event.attributes.is_empty());
        assert!(event.signature.is_empty());
    }
}
