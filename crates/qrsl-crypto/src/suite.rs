//! Algorithm and suite identifiers.

use core::fmt;
use core::str::FromStr;

use crate::Error;

/// The cryptographic suite a resolved backend offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoSuite {
    /// ECDH P-256 + ECDSA P-256 + AES-256-GCM. No post-quantum component.
    ClassicalP256,
    /// ML-KEM + ML-DSA with KEM-derived AEAD keys.
    PqcMlKemMlDsa,
    /// ML-KEM + ML-DSA plus X-Wing (X25519 + ML-KEM-768) HPKE.
    HybridXWing,
}

impl CryptoSuite {
    /// Check if this suite includes a post-quantum component.
    pub fn is_post_quantum(&self) -> bool {
        !matches!(self, Self::ClassicalP256)
    }

    /// Stable display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClassicalP256 => "classical-p256",
            Self::PqcMlKemMlDsa => "pqc-mlkem-mldsa",
            Self::HybridXWing => "hybrid-xwing",
        }
    }
}

impl fmt::Display for CryptoSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ML-KEM parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KemVariant {
    /// ML-KEM-768 (NIST level 3).
    MlKem768,
    /// ML-KEM-1024 (NIST level 5).
    MlKem1024,
}

impl KemVariant {
    /// Algorithm family, used in key-store service names.
    pub fn family(&self) -> &'static str {
        "ML-KEM"
    }

    /// Parameter-set label, used in key-store service names.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::MlKem768 => "768",
            Self::MlKem1024 => "1024",
        }
    }

    /// Encapsulation key size in bytes.
    pub fn public_key_len(&self) -> usize {
        match self {
            Self::MlKem768 => 1184,
            Self::MlKem1024 => 1568,
        }
    }

    /// Ciphertext size in bytes.
    pub fn ciphertext_len(&self) -> usize {
        match self {
            Self::MlKem768 => 1088,
            Self::MlKem1024 => 1568,
        }
    }
}

impl fmt::Display for KemVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family(), self.variant())
    }
}

/// Signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// ECDSA over P-256 with SHA-256.
    EcdsaP256,
    /// ML-DSA-65 (NIST level 3).
    MlDsa65,
    /// ML-DSA-87 (NIST level 5).
    MlDsa87,
}

impl SignatureAlgorithm {
    /// Check if this is a post-quantum algorithm.
    pub fn is_post_quantum(&self) -> bool {
        !matches!(self, Self::EcdsaP256)
    }

    /// Algorithm family, used in key-store service names.
    pub fn family(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "ECDSA",
            Self::MlDsa65 | Self::MlDsa87 => "ML-DSA",
        }
    }

    /// Parameter-set label, used in key-store service names.
    pub fn variant(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "P256",
            Self::MlDsa65 => "65",
            Self::MlDsa87 => "87",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family(), self.variant())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    /// Parse configuration names such as `ML-DSA-65`, `mldsa87` or `P-256`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "mldsa65" | "dilithium3" => Ok(Self::MlDsa65),
            "mldsa87" | "dilithium5" => Ok(Self::MlDsa87),
            "p256" | "ecdsap256" | "ecdsa" => Ok(Self::EcdsaP256),
            _ => Err(Error::Unsupported(format!("signature algorithm {:?}", s))),
        }
    }
}

/// AEAD algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AeadAlgorithm {
    /// AES-256-GCM.
    #[default]
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// HPKE AEAD identifier (RFC 9180 §7.3).
    pub fn hpke_id(&self) -> u16 {
        match self {
            Self::Aes256Gcm => 0x0002,
            Self::ChaCha20Poly1305 => 0x0003,
        }
    }
}
