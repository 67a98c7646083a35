//! ECDSA P-256 key pairs with secure memory handling.
//!
//! The key pair signs audit events; its public half travels inside
//! exported certifications so third parties can re-verify the chain.

use std::io::Write;
use std::path::Path;

use base64::Engine;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Length in bytes of the P-256 secret scalar.
const SECRET_KEY_LEN: usize = 32;

/// PEM armour label for exported public keys.
const PEM_LABEL: &str = "EC PUBLIC KEY";

/// An ECDSA P-256 key pair.
///
/// The secret scalar never leaves this struct except through
/// [`secret_key_bytes`](Self::secret_key_bytes); intermediate buffers used
/// during load are zeroized.
pub struct KeyPair {
    signing_key: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public = PublicKey::from_verifying_key(*signing_key.verifying_key());
        Self {
            signing_key,
            public,
        }
    }

    /// Create from a secret scalar (32 bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSecretKey`] if the slice is not exactly
    /// 32 bytes or does not encode a valid non-zero scalar.
    pub fn from_secret_key(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(CryptoError::InvalidSecretKey(format!(
                "expected {SECRET_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        let public = PublicKey::from_verifying_key(*signing_key.verifying_key());

        Ok(Self {
            signing_key,
            public,
        })
    }

    /// Export the secret scalar (careful - sensitive!).
    ///
    /// This should only be used for secure storage.
    #[must_use]
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LEN] {
        self.signing_key.to_bytes().into()
    }

    /// Get the public half of the key pair.
    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Get a short key ID (first 8 bytes of the public key fingerprint).
    ///
    /// Useful for identifying keys in logs without exposing the full key.
    #[must_use]
    pub fn key_id(&self) -> [u8; 8] {
        self.public.key_id()
    }

    /// Get the key ID as a hex string.
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        self.public.key_id_hex()
    }

    /// Sign a prehashed 32-byte digest.
    ///
    /// Produces the ASN.1 DER encoding of the `(r, s)` signature pair.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the curve operation fails.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> CryptoResult<Vec<u8>> {
        let signature: EcdsaSignature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Load an existing key from a file, or generate and save a new one.
    ///
    /// If the file exists, reads the 32-byte secret scalar and reconstructs
    /// the key pair. If the file does not exist, generates a new key pair and
    /// writes it atomically with 0o600 permissions on Unix (no world-readable
    /// window).
    ///
    /// Creates parent directories if needed.
    ///
    /// # Security
    ///
    /// - On Unix, uses `O_CREAT | O_EXCL` (atomic create) with mode 0o600
    ///   to prevent TOCTOU races and world-readable windows.
    /// - Refuses to read key files that are symlinks (symlink attack
    ///   protection).
    /// - File read buffers are wrapped in `Zeroizing<Vec<u8>>` so secret key
    ///   material is cleared from memory when no longer needed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] on I/O failures or symlink detection,
    /// or [`CryptoError::InvalidSecretKey`] if the file contents are not a
    /// valid scalar.
    pub fn load_or_generate(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CryptoError::IoError(e.to_string()))?;
        }

        // Attempt atomic creation first (Unix: O_CREAT | O_EXCL with mode 0o600).
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
            {
                Ok(mut file) => {
                    let kp = Self::generate();
                    let secret = Zeroizing::new(kp.secret_key_bytes());
                    file.write_all(secret.as_slice())
                        .map_err(|e| CryptoError::IoError(e.to_string()))?;
                    return Ok(kp);
                },
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // Fall through to the read path below.
                },
                Err(e) => return Err(CryptoError::IoError(e.to_string())),
            }
        }

        #[cfg(not(unix))]
        if !path.exists() {
            let kp = Self::generate();
            let secret = Zeroizing::new(kp.secret_key_bytes());
            std::fs::write(path, secret.as_slice())
                .map_err(|e| CryptoError::IoError(e.to_string()))?;
            return Ok(kp);
        }

        // Refuse symlinks (prevents symlink attacks redirecting to another file).
        let meta =
            std::fs::symlink_metadata(path).map_err(|e| CryptoError::IoError(e.to_string()))?;
        if meta.file_type().is_symlink() {
            return Err(CryptoError::IoError(
                "refusing to read key file: path is a symlink".into(),
            ));
        }

        let bytes =
            Zeroizing::new(std::fs::read(path).map_err(|e| CryptoError::IoError(e.to_string()))?);
        Self::from_secret_key(&bytes)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id_hex())
            .finish_non_exhaustive()
    }
}

/// The public half of a signing key (safe to share, serialize, etc.).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Wrap a raw verifying key.
    #[must_use]
    pub const fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Encode as DER SubjectPublicKeyInfo (the PKIX key-exchange encoding).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyEncoding`] if DER serialisation fails.
    pub fn to_spki_der(&self) -> CryptoResult<Vec<u8>> {
        let document = self
            .key
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Decode from DER SubjectPublicKeyInfo bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not encode a
    /// P-256 public key.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        let key = VerifyingKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Encode as a PEM armour block labelled `EC PUBLIC KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyEncoding`] if DER serialisation fails.
    pub fn to_pem(&self) -> CryptoResult<String> {
        let body = base64::engine::general_purpose::STANDARD.encode(self.to_spki_der()?);

        let mut out = format!("-----BEGIN {PEM_LABEL}-----\n");
        let mut rest = body.as_str();
        while !rest.is_empty() {
            let (line, tail) = rest.split_at(rest.len().min(64));
            out.push_str(line);
            out.push('\n');
            rest = tail;
        }
        out.push_str(&format!("-----END {PEM_LABEL}-----\n"));
        Ok(out)
    }

    /// Decode from a PEM armour block.
    ///
    /// The block label must be exactly `EC PUBLIC KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ArmourLabel`] on a mismatched label,
    /// [`CryptoError::MalformedArmour`] on a structurally broken block, and
    /// decoding errors from the DER body otherwise.
    pub fn from_pem(text: &str) -> CryptoResult<Self> {
        let mut label: Option<&str> = None;
        let mut body = String::new();
        let mut complete = false;

        for line in text.lines() {
            let line = line.trim();
            if let Some(found) = line
                .strip_prefix("-----BEGIN ")
                .and_then(|l| l.strip_suffix("-----"))
            {
                if label.is_some() {
                    return Err(CryptoError::MalformedArmour);
                }
                label = Some(found);
            } else if line.starts_with("-----END ") {
                complete = true;
                break;
            } else if label.is_some() && !line.is_empty() {
                body.push_str(line);
            }
        }

        match label {
            None => Err(CryptoError::MalformedArmour),
            Some(found) if found != PEM_LABEL => Err(CryptoError::ArmourLabel {
                found: found.to_string(),
            }),
            Some(_) if !complete => Err(CryptoError::MalformedArmour),
            Some(_) => {
                let der = base64::engine::general_purpose::STANDARD
                    .decode(&body)
                    .map_err(|_| CryptoError::InvalidBase64Encoding)?;
                Self::from_spki_der(&der)
            },
        }
    }

    /// Decode a key file that is either PEM-armoured or raw SPKI DER.
    ///
    /// # Errors
    ///
    /// Returns the underlying armour or DER decoding error.
    pub fn from_key_bytes(raw: &[u8]) -> CryptoResult<Self> {
        if raw.trim_ascii_start().starts_with(b"-----BEGIN") {
            let text = std::str::from_utf8(raw).map_err(|_| CryptoError::MalformedArmour)?;
            Self::from_pem(text)
        } else {
            Self::from_spki_der(raw)
        }
    }

    /// Verify an ASN.1 DER signature against a prehashed 32-byte digest.
    ///
    /// Trailing bytes after the DER sequence are rejected. Returns `false`
    /// on any decode or curve failure; never panics.
    #[must_use]
    pub fn verify_digest(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        let Ok(signature) = EcdsaSignature::from_der(signature) else {
            return false;
        };
        self.key.verify_prehash(digest, &signature).is_ok()
    }

    /// SHA-256 fingerprint over the uncompressed curve-point coordinates.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        let point = self.key.to_encoded_point(false);
        let mut hasher = Sha256::new();
        if let Some(x) = point.x() {
            hasher.update(x);
        }
        if let Some(y) = point.y() {
            hasher.update(y);
        }
        hasher.finalize().into()
    }

    /// The fingerprint as a hex string.
    #[must_use]
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }

    /// Get a short key ID (first 8 bytes of the fingerprint).
    #[must_use]
    pub fn key_id(&self) -> [u8; 8] {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.fingerprint()[..8]);
        id
    }

    /// Get the key ID as a hex string.
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        hex::encode(self.key_id())
    }

    /// Encode the SPKI form as a base64 string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyEncoding`] if DER serialisation fails.
    pub fn to_base64(&self) -> CryptoResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_spki_der()?))
    }

    /// Decode from a base64 SPKI string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid base64 or not a valid key.
    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|_| CryptoError::InvalidBase64Encoding)?;
        Self::from_spki_der(&der)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.key_id_hex())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let encoded = self.to_base64().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}
