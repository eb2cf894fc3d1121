//! Signed bearer tokens.
//!
//! The signing algorithm is never configured directly: it is derived from
//! the private key, so a key and an algorithm can never disagree. The public
//! half used for verification is derived from the same key.
//!
//! `jsonwebtoken` signs every algorithm it knows. P-521 (`ES512`) and Ed448
//! (`EdDSA`) keys are signed here with `p521` and `ed448-rust` over the
//! same compact JWS encoding.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p521::ecdsa::signature::{Signer, Verifier};
use pkcs8::der::Decode;
use pkcs8::der::asn1::OctetStringRef;
use pkcs8::{DecodePrivateKey, ObjectIdentifier, PrivateKeyInfo, SecretDocument};
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::auth::{TokenClaims, TokenKind};

const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
const OID_P521: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");
const OID_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
const OID_ED448: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.113");

const PKCS8_LABEL: &str = "PRIVATE KEY";
const PKCS1_RSA_LABEL: &str = "RSA PRIVATE KEY";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Wrong token kind: expected {expected:?}")]
    WrongTokenKind { expected: TokenKind },

    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Cannot read key: {0}")]
    KeyIo(#[from] std::io::Error),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Algorithm identifiers that a key can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    Es256,
    Es384,
    Es512,
    Rs256,
    Rs384,
    Rs512,
    EdDsa,
}

impl SigningAlgorithm {
    /// JOSE `alg` header value.
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::Es256 => "ES256",
            SigningAlgorithm::Es384 => "ES384",
            SigningAlgorithm::Es512 => "ES512",
            SigningAlgorithm::Rs256 => "RS256",
            SigningAlgorithm::Rs384 => "RS384",
            SigningAlgorithm::Rs512 => "RS512",
            SigningAlgorithm::EdDsa => "EdDSA",
        }
    }

    /// RSA strength by modulus size.
    pub fn for_rsa_bits(bits: usize) -> Self {
        if bits >= 4096 {
            SigningAlgorithm::Rs512
        } else if bits >= 3072 {
            SigningAlgorithm::Rs384
        } else {
            SigningAlgorithm::Rs256
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key family as read from the PEM envelope.
enum KeyKind {
    Ec(SigningAlgorithm),
    Rsa,
    Ed25519,
    Ed448,
}

fn unsupported(msg: impl Into<String>) -> TokenError {
    TokenError::UnsupportedKey(msg.into())
}

fn read_pem(pem: &str) -> Result<(String, SecretDocument), TokenError> {
    let (label, doc) =
        SecretDocument::from_pem(pem).map_err(|e| unsupported(format!("invalid PEM: {e}")))?;
    Ok((label.to_string(), doc))
}

fn key_kind(label: &str, der: &[u8]) -> Result<KeyKind, TokenError> {
    if label == PKCS1_RSA_LABEL {
        return Ok(KeyKind::Rsa);
    }
    if label != PKCS8_LABEL {
        return Err(unsupported(format!("unexpected PEM label {label:?}")));
    }
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| unsupported(format!("invalid PKCS#8 key: {e}")))?;
    let oid = info.algorithm.oid;
    if oid == OID_EC_PUBLIC_KEY {
        let curve = info
            .algorithm
            .parameters_oid()
            .map_err(|_| unsupported("EC key without named curve"))?;
        let alg = match curve {
            c if c == OID_P256 => SigningAlgorithm::Es256,
            c if c == OID_P384 => SigningAlgorithm::Es384,
            c if c == OID_P521 => SigningAlgorithm::Es512,
            other => return Err(unsupported(format!("unsupported EC curve {other}"))),
        };
        Ok(KeyKind::Ec(alg))
    } else if oid == OID_RSA {
        Ok(KeyKind::Rsa)
    } else if oid == OID_ED25519 {
        Ok(KeyKind::Ed25519)
    } else if oid == OID_ED448 {
        Ok(KeyKind::Ed448)
    } else {
        Err(unsupported(format!("unsupported key type {oid}")))
    }
}

fn rsa_key_pair(label: &str, der: &[u8]) -> Result<RsaKeyPair, TokenError> {
    let parsed = if label == PKCS1_RSA_LABEL {
        RsaKeyPair::from_der(der)
    } else {
        RsaKeyPair::from_pkcs8(der)
    };
    parsed.map_err(|e| unsupported(format!("invalid RSA key: {e}")))
}

/// Classify a PEM private key without loading it for signing.
pub fn classify_key(pem: &str) -> Result<SigningAlgorithm, TokenError> {
    let (label, doc) = read_pem(pem)?;
    match key_kind(&label, doc.as_bytes())? {
        KeyKind::Ec(alg) => Ok(alg),
        KeyKind::Rsa => {
            let pair = rsa_key_pair(&label, doc.as_bytes())?;
            Ok(SigningAlgorithm::for_rsa_bits(pair.public().modulus_len() * 8))
        }
        KeyKind::Ed25519 | KeyKind::Ed448 => Ok(SigningAlgorithm::EdDsa),
    }
}

/// Caller-supplied token content; timestamps are added at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: i64,
    /// Request host the token was issued for.
    pub issuer: String,
    pub kind: TokenKind,
    pub jti: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// JOSE header of a compact token.
#[derive(Debug, Serialize, Deserialize)]
struct JoseHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// The three segments of a compact JWS.
struct Compact<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> Compact<'a> {
    fn split(token: &'a str) -> Result<Self, TokenError> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(signature), None) => Ok(Self {
                header,
                payload,
                signature,
            }),
            _ => Err(TokenError::Malformed("expected three segments".into())),
        }
    }

    /// Bytes covered by the signature.
    fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    fn header(&self) -> Result<JoseHeader, TokenError> {
        decode_segment(self.header)
    }

    fn claims(&self) -> Result<TokenClaims, TokenError> {
        decode_segment(self.payload)
    }

    fn signature(&self) -> Result<Vec<u8>, TokenError> {
        URL_SAFE_NO_PAD
            .decode(self.signature)
            .map_err(|e| TokenError::Malformed(format!("signature: {e}")))
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Key material, by the library that signs with it.
#[derive(Clone)]
enum SigningKeys {
    Jwt {
        algorithm: Algorithm,
        encoding: EncodingKey,
        decoding: DecodingKey,
    },
    P521 {
        signing: p521::ecdsa::SigningKey,
        verifying: p521::ecdsa::VerifyingKey,
    },
    Ed448 {
        private: ed448_rust::PrivateKey,
        public: ed448_rust::PublicKey,
    },
}

fn p521_keys(der: &[u8]) -> Result<SigningKeys, TokenError> {
    let secret = p521::SecretKey::from_pkcs8_der(der)
        .map_err(|e| unsupported(format!("invalid P-521 key: {e}")))?;
    let signing = p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes())
        .map_err(|e| unsupported(format!("invalid P-521 key: {e}")))?;
    let verifying = p521::ecdsa::VerifyingKey::from(&signing);
    Ok(SigningKeys::P521 { signing, verifying })
}

/// PKCS#8 Ed448 keys wrap the 57-byte seed in an inner OCTET STRING.
fn ed448_keys(der: &[u8]) -> Result<SigningKeys, TokenError> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| unsupported(format!("invalid PKCS#8 key: {e}")))?;
    let seed = OctetStringRef::from_der(info.private_key)
        .map_err(|e| unsupported(format!("invalid Ed448 key: {e}")))?;
    let private = ed448_rust::PrivateKey::try_from(seed.as_bytes())
        .map_err(|e| unsupported(format!("invalid Ed448 key: {e:?}")))?;
    let public = ed448_rust::PublicKey::from(&private);
    Ok(SigningKeys::Ed448 { private, public })
}

fn jwt_keys(
    kind: &KeyKind,
    label: &str,
    der: &[u8],
    pem: &str,
) -> Result<(SigningAlgorithm, SigningKeys), TokenError> {
    let (algorithm, jwt_algorithm, decoding) = match kind {
        KeyKind::Ec(alg) => {
            let (ring_alg, jwt_alg) = match alg {
                SigningAlgorithm::Es256 => {
                    (&signature::ECDSA_P256_SHA256_FIXED_SIGNING, Algorithm::ES256)
                }
                SigningAlgorithm::Es384 => {
                    (&signature::ECDSA_P384_SHA384_FIXED_SIGNING, Algorithm::ES384)
                }
                other => return Err(unsupported(format!("unexpected EC algorithm {other}"))),
            };
            let pair = EcdsaKeyPair::from_pkcs8(ring_alg, der, &SystemRandom::new())
                .map_err(|e| unsupported(format!("invalid EC key: {e}")))?;
            (*alg, jwt_alg, DecodingKey::from_ec_der(pair.public_key().as_ref()))
        }
        KeyKind::Rsa => {
            let pair = rsa_key_pair(label, der)?;
            let alg = SigningAlgorithm::for_rsa_bits(pair.public().modulus_len() * 8);
            let jwt_alg = match alg {
                SigningAlgorithm::Rs512 => Algorithm::RS512,
                SigningAlgorithm::Rs384 => Algorithm::RS384,
                _ => Algorithm::RS256,
            };
            (alg, jwt_alg, DecodingKey::from_rsa_der(pair.public_key().as_ref()))
        }
        KeyKind::Ed25519 => {
            let pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der)
                .map_err(|e| unsupported(format!("invalid Ed25519 key: {e}")))?;
            (
                SigningAlgorithm::EdDsa,
                Algorithm::EdDSA,
                DecodingKey::from_ed_der(pair.public_key().as_ref()),
            )
        }
        KeyKind::Ed448 => return Err(unsupported("Ed448 is not a jsonwebtoken key")),
    };

    let encoding = match kind {
        KeyKind::Rsa => EncodingKey::from_rsa_pem(pem.as_bytes()),
        KeyKind::Ec(_) => EncodingKey::from_ec_pem(pem.as_bytes()),
        _ => EncodingKey::from_ed_pem(pem.as_bytes()),
    }
    .map_err(|e| unsupported(format!("cannot build signing key: {e}")))?;

    Ok((
        algorithm,
        SigningKeys::Jwt {
            algorithm: jwt_algorithm,
            encoding,
            decoding,
        },
    ))
}

/// Signs and verifies tokens with one key pair.
#[derive(Clone)]
pub struct TokenService {
    algorithm: SigningAlgorithm,
    keys: SigningKeys,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Read a PEM private key from `path` and build the service.
    ///
    /// Any unsupported key type or curve is an error here, at startup.
    pub fn load_signing_material(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path)?;
        let service = Self::from_pem(&pem)?;
        info!(path = %path.display(), algorithm = %service.algorithm, "loaded signing key");
        Ok(service)
    }

    pub fn from_pem(pem: &str) -> Result<Self, TokenError> {
        let (label, doc) = read_pem(pem)?;
        let der = doc.as_bytes();
        let kind = key_kind(&label, der)?;

        let (algorithm, keys) = match kind {
            KeyKind::Ec(SigningAlgorithm::Es512) => (SigningAlgorithm::Es512, p521_keys(der)?),
            KeyKind::Ed448 => (SigningAlgorithm::EdDsa, ed448_keys(der)?),
            ref other => jwt_keys(other, &label, der, pem)?,
        };
        Ok(Self { algorithm, keys })
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Sign `payload`, expiring `ttl` from now.
    pub fn sign(&self, payload: &TokenPayload, ttl: Duration) -> Result<String, TokenError> {
        self.sign_at(payload, ttl, Utc::now())
    }

    /// Sign `payload` as if issued at `now`.
    pub fn sign_at(
        &self,
        payload: &TokenPayload,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| TokenError::Signing(format!("ttl out of range: {e}")))?;
        let claims = TokenClaims {
            sub: payload.user_id.to_string(),
            iss: payload.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: payload.jti.clone(),
            typ: payload.kind,
            roles: payload.roles.clone(),
            permissions: payload.permissions.clone(),
        };

        if let SigningKeys::Jwt {
            algorithm,
            encoding,
            ..
        } = &self.keys
        {
            return encode(&Header::new(*algorithm), &claims, encoding)
                .map_err(|e| TokenError::Signing(e.to_string()));
        }

        let header = JoseHeader {
            alg: self.algorithm.as_str().to_string(),
            typ: Some("JWT".into()),
        };
        let input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = match &self.keys {
            SigningKeys::P521 { signing, .. } => {
                let sig: p521::ecdsa::Signature = signing
                    .try_sign(input.as_bytes())
                    .map_err(|e| TokenError::Signing(e.to_string()))?;
                sig.to_bytes().to_vec()
            }
            SigningKeys::Ed448 { private, .. } => private
                .sign(input.as_bytes(), None)
                .map_err(|e| TokenError::Signing(format!("{e:?}")))?
                .to_vec(),
            SigningKeys::Jwt { .. } => return Err(TokenError::Signing("unreachable key".into())),
        };
        Ok(format!("{input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify signature, algorithm and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let compact = Compact::split(token)?;
        let header = compact.header()?;
        if header.alg != self.algorithm.as_str() {
            return Err(TokenError::AlgorithmMismatch {
                expected: self.algorithm.to_string(),
                found: header.alg,
            });
        }

        match &self.keys {
            SigningKeys::Jwt {
                algorithm,
                decoding,
                ..
            } => {
                let mut validation = Validation::new(*algorithm);
                validation.leeway = 0;
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "sub", "iat"]);

                decode::<TokenClaims>(token, decoding, &validation)
                    .map(|data| data.claims)
                    .map_err(|e| match e.kind() {
                        JwtErrorKind::ExpiredSignature => TokenError::Expired,
                        JwtErrorKind::InvalidSignature => TokenError::InvalidSignature,
                        _ => TokenError::Malformed(e.to_string()),
                    })
            }
            SigningKeys::P521 { verifying, .. } => {
                let signature = p521::ecdsa::Signature::from_slice(&compact.signature()?)
                    .map_err(|_| TokenError::InvalidSignature)?;
                verifying
                    .verify(compact.signing_input().as_bytes(), &signature)
                    .map_err(|_| TokenError::InvalidSignature)?;
                Self::check_expiry(compact.claims()?)
            }
            SigningKeys::Ed448 { public, .. } => {
                let signature = compact.signature()?;
                if signature.len() != ed448_rust::SIG_LENGTH {
                    return Err(TokenError::InvalidSignature);
                }
                public
                    .verify(compact.signing_input().as_bytes(), &signature, None)
                    .map_err(|_| TokenError::InvalidSignature)?;
                Self::check_expiry(compact.claims()?)
            }
        }
    }

    /// Same rule as the `jsonwebtoken` path with zero leeway.
    fn check_expiry(claims: TokenClaims) -> Result<TokenClaims, TokenError> {
        if claims.exp < Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Verify and additionally require the given token kind.
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.typ != expected {
            return Err(TokenError::WrongTokenKind { expected });
        }
        Ok(claims)
    }

    /// Decode claims without checking signature or expiry.
    ///
    /// Only for classifying a rejected token (e.g. logging whose expired
    /// token was presented). Never base an access decision on the result.
    pub fn parse_unverified(token: &str) -> Result<TokenClaims, TokenError> {
        let compact = Compact::split(token)?;
        compact.header()?;
        compact.claims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/keys");

    fn pem(name: &str) -> String {
        std::fs::read_to_string(format!("{FIXTURES}/{name}.pem")).unwrap()
    }

    fn service(name: &str) -> TokenService {
        TokenService::from_pem(&pem(name)).unwrap()
    }

    fn payload() -> TokenPayload {
        TokenPayload {
            user_id: 7,
            issuer: "localhost".into(),
            kind: TokenKind::Access,
            jti: "jti-1".into(),
            roles: vec!["user".into()],
            permissions: vec!["user:me".into(), "user:read".into()],
        }
    }

    #[test]
    fn classifies_every_supported_key() {
        let cases = [
            ("p256", SigningAlgorithm::Es256),
            ("p384", SigningAlgorithm::Es384),
            ("p521", SigningAlgorithm::Es512),
            ("rsa2048", SigningAlgorithm::Rs256),
            ("rsa2048_pkcs1", SigningAlgorithm::Rs256),
            ("rsa3072", SigningAlgorithm::Rs384),
            ("rsa4096", SigningAlgorithm::Rs512),
            ("ed25519", SigningAlgorithm::EdDsa),
            ("ed448", SigningAlgorithm::EdDsa),
        ];
        for (name, expected) in cases {
            assert_eq!(classify_key(&pem(name)).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn rsa_thresholds() {
        assert_eq!(SigningAlgorithm::for_rsa_bits(2048), SigningAlgorithm::Rs256);
        assert_eq!(SigningAlgorithm::for_rsa_bits(3071), SigningAlgorithm::Rs256);
        assert_eq!(SigningAlgorithm::for_rsa_bits(3072), SigningAlgorithm::Rs384);
        assert_eq!(SigningAlgorithm::for_rsa_bits(4095), SigningAlgorithm::Rs384);
        assert_eq!(SigningAlgorithm::for_rsa_bits(4096), SigningAlgorithm::Rs512);
    }

    #[test]
    fn unsupported_material_fails_at_load() {
        let err = TokenService::from_pem(&pem("secp256k1")).unwrap_err();
        assert!(matches!(err, TokenError::UnsupportedKey(_)), "{err}");
        assert!(matches!(
            TokenService::from_pem("not a key").unwrap_err(),
            TokenError::UnsupportedKey(_)
        ));
        assert!(matches!(
            TokenService::load_signing_material("/nonexistent/key.pem").unwrap_err(),
            TokenError::KeyIo(_)
        ));
    }

    #[test]
    fn sign_and_verify_round_trip_for_each_family() {
        let names = [
            "p256",
            "p384",
            "p521",
            "rsa2048",
            "rsa2048_pkcs1",
            "ed25519",
            "ed448",
        ];
        for name in names {
            let svc = service(name);
            let token = svc.sign(&payload(), Duration::from_secs(60)).unwrap();
            let claims = svc.verify(&token).unwrap();
            assert_eq!(claims.user_id(), Some(7), "{name}");
            assert_eq!(claims.iss, "localhost");
            assert_eq!(claims.exp - claims.iat, 60);
            assert_eq!(claims.permissions, payload().permissions);
        }
    }

    #[test]
    fn p521_and_ed448_sign_with_their_own_algorithm() {
        let es512 = service("p521");
        assert_eq!(es512.algorithm(), SigningAlgorithm::Es512);
        let token = es512.sign(&payload(), Duration::from_secs(60)).unwrap();
        let header: JoseHeader = decode_segment(token.split('.').next().unwrap()).unwrap();
        assert_eq!(header.alg, "ES512");
        // r || s, 66 bytes each
        let sig = URL_SAFE_NO_PAD.decode(token.rsplit('.').next().unwrap()).unwrap();
        assert_eq!(sig.len(), 132);

        let ed448 = service("ed448");
        assert_eq!(ed448.algorithm(), SigningAlgorithm::EdDsa);
        let token = ed448.sign(&payload(), Duration::from_secs(60)).unwrap();
        let sig = URL_SAFE_NO_PAD.decode(token.rsplit('.').next().unwrap()).unwrap();
        assert_eq!(sig.len(), 114);
    }

    #[test]
    fn tampered_p521_and_ed448_tokens_are_rejected() {
        for name in ["p521", "ed448"] {
            let svc = service(name);
            let token = svc.sign(&payload(), Duration::from_secs(60)).unwrap();
            let mut forged = payload();
            forged.permissions.push("role:create".into());
            let other = svc.sign(&forged, Duration::from_secs(60)).unwrap();

            // forged claims under the original signature
            let parts: Vec<&str> = token.split('.').collect();
            let other_parts: Vec<&str> = other.split('.').collect();
            let spliced = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
            assert!(
                matches!(svc.verify(&spliced), Err(TokenError::InvalidSignature)),
                "{name}"
            );
            let truncated = format!("{}.{}.{}", parts[0], parts[1], &parts[2][..8]);
            assert!(
                matches!(svc.verify(&truncated), Err(TokenError::InvalidSignature)),
                "{name}"
            );
            let mut long = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
            long.extend_from_slice(&[0, 0, 0]);
            let extended = format!("{}.{}.{}", parts[0], parts[1], URL_SAFE_NO_PAD.encode(long));
            assert!(
                matches!(svc.verify(&extended), Err(TokenError::InvalidSignature)),
                "{name}"
            );
        }
    }

    #[test]
    fn expired_p521_and_ed448_tokens_are_rejected() {
        let issued = Utc::now() - chrono::Duration::hours(1);
        for name in ["p521", "ed448"] {
            let svc = service(name);
            let token = svc
                .sign_at(&payload(), Duration::from_secs(60), issued)
                .unwrap();
            assert!(matches!(svc.verify(&token), Err(TokenError::Expired)), "{name}");
            assert_eq!(
                TokenService::parse_unverified(&token).unwrap().user_id(),
                Some(7)
            );
        }
    }

    #[test]
    fn es512_and_eddsa_pin_their_algorithm() {
        let es512 = service("p521").sign(&payload(), Duration::from_secs(60)).unwrap();
        let err = service("p256").verify(&es512).unwrap_err();
        assert!(
            matches!(&err, TokenError::AlgorithmMismatch { expected, found } if expected == "ES256" && found == "ES512"),
            "{err}"
        );
        let es256 = service("p256").sign(&payload(), Duration::from_secs(60)).unwrap();
        assert!(matches!(
            service("p521").verify(&es256),
            Err(TokenError::AlgorithmMismatch { .. })
        ));

        // same alg header, different key family
        let ed25519 = service("ed25519")
            .sign(&payload(), Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            service("ed448").verify(&ed25519),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn signing_is_deterministic_apart_from_timestamps() {
        let svc = service("ed25519");
        let now = Utc::now();
        let a = svc.sign_at(&payload(), Duration::from_secs(60), now).unwrap();
        let b = svc.sign_at(&payload(), Duration::from_secs(60), now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service("ed25519");
        let issued = Utc::now() - chrono::Duration::hours(1);
        let token = svc
            .sign_at(&payload(), Duration::from_secs(60), issued)
            .unwrap();
        assert!(matches!(svc.verify(&token), Err(TokenError::Expired)));

        let claims = TokenService::parse_unverified(&token).unwrap();
        assert_eq!(claims.user_id(), Some(7));
    }

    #[test]
    fn foreign_key_signature_is_rejected() {
        let token = service("ed25519_other")
            .sign(&payload(), Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            service("ed25519").verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn algorithm_mismatch_is_reported() {
        let token = service("rsa2048")
            .sign(&payload(), Duration::from_secs(60))
            .unwrap();
        let err = service("p256").verify(&token).unwrap_err();
        assert!(
            matches!(&err, TokenError::AlgorithmMismatch { expected, found } if expected == "ES256" && found == "RS256"),
            "{err}"
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let svc = service("p256");
        assert!(matches!(svc.verify("abc"), Err(TokenError::Malformed(_))));
        assert!(matches!(
            TokenService::parse_unverified("a.b.c"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn token_kind_is_enforced() {
        let svc = service("p256");
        let mut refresh = payload();
        refresh.kind = TokenKind::Refresh;
        let token = svc.sign(&refresh, Duration::from_secs(60)).unwrap();
        assert!(svc.verify_kind(&token, TokenKind::Refresh).is_ok());
        assert!(matches!(
            svc.verify_kind(&token, TokenKind::Access),
            Err(TokenError::WrongTokenKind { .. })
        ));
    }
}
