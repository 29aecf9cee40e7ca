//! Authenticity checks for inbound requests.
//!
//! Two schemes are supported and the scheme is fixed per integration:
//!
//! - [`Verifier::Hmac`] computes a keyed hash over the exact raw body and
//!   compares it against a `sha256=<hex>` (or legacy `sha1=<hex>`) signature.
//! - [`Verifier::StaticToken`] compares a caller-supplied token against the
//!   configured one.
//!
//! Verification is a pure predicate. Malformed input is never an error, it is
//! simply [`Verification::Rejected`].

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Why a request was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The request carried no signature or token.
    MissingCredential,
    /// No secret is configured for this integration.
    MissingSecret,
    /// The signature header could not be understood.
    Malformed,
    /// The credential did not match.
    Mismatch,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::MissingCredential => "missing signature",
            RejectReason::MissingSecret => "no secret configured",
            RejectReason::Malformed => "malformed signature",
            RejectReason::Mismatch => "signature mismatch",
        };
        f.write_str(text)
    }
}

/// Outcome of [`Verifier::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Authenticated,
    Rejected(RejectReason),
}

/// Verification scheme bound to one integration.
#[derive(Clone)]
pub enum Verifier {
    /// Keyed-hash comparison over the raw body.
    Hmac { secret: String },
    /// Direct comparison of a shared token.
    StaticToken { token: String },
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verifier::Hmac { .. } => f.debug_struct("Hmac").field("secret", &"<REDACTED>").finish(),
            Verifier::StaticToken { .. } => f
                .debug_struct("StaticToken")
                .field("token", &"<REDACTED>")
                .finish(),
        }
    }
}

impl Verifier {
    pub fn hmac(secret: impl Into<String>) -> Self {
        Verifier::Hmac {
            secret: secret.into(),
        }
    }

    pub fn static_token(token: impl Into<String>) -> Self {
        Verifier::StaticToken {
            token: token.into(),
        }
    }

    /// Checks `credential` against `body` using this scheme.
    ///
    /// `body` must be the bytes exactly as received on the wire.
    pub fn verify(&self, body: &[u8], credential: Option<&str>) -> Verification {
        let secret = match self {
            Verifier::Hmac { secret } => secret,
            Verifier::StaticToken { token } => token,
        };
        if secret.is_empty() {
            return Verification::Rejected(RejectReason::MissingSecret);
        }
        let Some(credential) = credential else {
            return Verification::Rejected(RejectReason::MissingCredential);
        };

        match self {
            Verifier::Hmac { secret } => verify_hmac(body, credential, secret.as_bytes()),
            Verifier::StaticToken { token } => {
                if bool::from(credential.as_bytes().ct_eq(token.as_bytes())) {
                    Verification::Authenticated
                } else {
                    Verification::Rejected(RejectReason::Mismatch)
                }
            }
        }
    }
}

fn verify_hmac(body: &[u8], header: &str, secret: &[u8]) -> Verification {
    let (algorithm, expected) = match parse_signature_header(header) {
        Some(parsed) => parsed,
        None => return Verification::Rejected(RejectReason::Malformed),
    };

    let matched = match algorithm {
        Algorithm::Sha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        Algorithm::Sha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    };

    if matched {
        Verification::Authenticated
    } else {
        Verification::Rejected(RejectReason::Mismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Sha256,
    Sha1,
}

/// Splits `sha256=<hex>` / `sha1=<hex>` into algorithm and raw digest bytes.
fn parse_signature_header(header: &str) -> Option<(Algorithm, Vec<u8>)> {
    let (algorithm, hex_sig) = if let Some(rest) = header.strip_prefix("sha256=") {
        (Algorithm::Sha256, rest)
    } else if let Some(rest) = header.strip_prefix("sha1=") {
        (Algorithm::Sha1, rest)
    } else {
        return None;
    };
    let bytes = hex::decode(hex_sig).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some((algorithm, bytes))
}

/// HMAC-SHA256 of `body` under `secret`.
pub fn compute_signature(body: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a digest as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Convenience for clients and tests: the header value a sender would attach.
pub fn sign(body: &[u8], secret: &str) -> String {
    format_signature_header(&compute_signature(body, secret.as_bytes()))
}
