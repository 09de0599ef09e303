//! Webhook signature verification.
//!
//! Three publisher conventions are supported: GitHub's `x-hub-signature-256`
//! (`sha256=<hex>`), Stripe's `stripe-signature` (`t=<ts>,v1=<hex>[,v1=<hex>]`),
//! and a generic `x-webhook-signature` header carrying the raw hex digest.
//! When no secret is configured for a publisher the request is accepted and
//! marked `signature_valid: true` — unsigned ingestion is a deliberate
//! default, not a bypass bug.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures against configured per-publisher secrets.
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify `body` against `headers` for `publisher`, using `secret` if one
    /// is configured. Returns `true` when the request should be treated as
    /// signed-and-valid.
    pub fn verify(
        publisher: &str,
        headers: &std::collections::HashMap<String, String>,
        body: &[u8],
        secret: Option<&str>,
    ) -> bool {
        let Some(secret) = secret else {
            return true;
        };

        match publisher {
            "github" => headers
                .get("x-hub-signature-256")
                .map(|sig| verify_github(sig, body, secret))
                .unwrap_or(false),
            "stripe" => headers
                .get("stripe-signature")
                .map(|sig| verify_stripe(sig, body, secret))
                .unwrap_or(false),
            _ => headers
                .get("x-webhook-signature")
                .map(|sig| verify_generic(sig, body, secret))
                .unwrap_or(false),
        }
    }

    fn mac(secret: &str) -> HmacSha256 {
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
    }

    fn digest_hex(secret: &str, data: &[u8]) -> String {
        let mut mac = Self::mac(secret);
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

fn verify_github(header: &str, body: &[u8], secret: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    constant_time_eq::constant_time_eq_n::<32>(
        match decode_fixed(hex_digest) {
            Some(d) => &d,
            None => return false,
        },
        &match decode_fixed(&SignatureVerifier::digest_hex(secret, body)) {
            Some(d) => d,
            None => return false,
        },
    )
}

fn verify_stripe(header: &str, body: &[u8], secret: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut v1_sigs: Vec<&str> = Vec::new();
    for part in header.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            match key {
                "t" => timestamp = Some(value),
                "v1" => v1_sigs.push(value),
                _ => {}
            }
        }
    }
    let Some(timestamp) = timestamp else {
        return false;
    };
    if v1_sigs.is_empty() {
        return false;
    }

    let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(body));
    let expected = SignatureVerifier::digest_hex(secret, signed_payload.as_bytes());

    v1_sigs.iter().any(|candidate| {
        constant_time_eq::constant_time_eq(candidate.as_bytes(), expected.as_bytes())
    })
}

fn verify_generic(header: &str, body: &[u8], secret: &str) -> bool {
    let expected = SignatureVerifier::digest_hex(secret, body);
    constant_time_eq::constant_time_eq(header.trim().as_bytes(), expected.as_bytes())
}

fn decode_fixed(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_secret_configured_bypasses_verification() {
        let h = headers(&[]);
        assert!(SignatureVerifier::verify("github", &h, b"{}", None));
    }

    #[test]
    fn github_signature_roundtrips() {
        let secret = "whsec_test";
        let body = b"{\"hello\":\"world\"}";
        let digest = SignatureVerifier::digest_hex(secret, body);
        let h = headers(&[("x-hub-signature-256", &format!("sha256={digest}"))]);
        assert!(SignatureVerifier::verify("github", &h, body, Some(secret)));
    }

    #[test]
    fn github_signature_rejects_tampered_body() {
        let secret = "whsec_test";
        let digest = SignatureVerifier::digest_hex(secret, b"{\"hello\":\"world\"}");
        let h = headers(&[("x-hub-signature-256", &format!("sha256={digest}"))]);
        assert!(!SignatureVerifier::verify(
            "github",
            &h,
            b"{\"hello\":\"mallory\"}",
            Some(secret)
        ));
    }

    #[test]
    fn stripe_signature_roundtrips() {
        let secret = "whsec_test";
        let body = b"{\"amount\":100}";
        let signed_payload = format!("1690000000.{}", String::from_utf8_lossy(body));
        let digest = SignatureVerifier::digest_hex(secret, signed_payload.as_bytes());
        let h = headers(&[(
            "stripe-signature",
            &format!("t=1690000000,v1={digest}"),
        )]);
        assert!(SignatureVerifier::verify("stripe", &h, body, Some(secret)));
    }

    #[test]
    fn generic_signature_roundtrips() {
        let secret = "s3cret";
        let body = b"payload";
        let digest = SignatureVerifier::digest_hex(secret, body);
        let h = headers(&[("x-webhook-signature", &digest)]);
        assert!(SignatureVerifier::verify("acme", &h, body, Some(secret)));
    }

    #[test]
    fn missing_header_fails_when_secret_configured() {
        let h = headers(&[]);
        assert!(!SignatureVerifier::verify("github", &h, b"{}", Some("secret")));
    }
}
