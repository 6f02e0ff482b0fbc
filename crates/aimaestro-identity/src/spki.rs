//! Minimal SPKI/PKCS8 framing for Ed25519 keys.
//!
//! We deliberately don't pull in a general DER parser: Ed25519 SPKI and PKCS8
//! wrappers have a fixed-size header, so raw key bytes are extracted and
//! re-wrapped with a byte-for-byte constant prefix.

/// `SEQUENCE { SEQUENCE { OID ed25519 }, BIT STRING (0 unused bits) }` header
/// preceding the 32-byte raw public key in an Ed25519 SubjectPublicKeyInfo.
pub const SPKI_PREFIX: [u8; 12] = [
	0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// `SEQUENCE { INTEGER 0, SEQUENCE { OID ed25519 }, OCTET STRING (OCTET STRING 32) }`
/// header preceding the 32-byte raw private seed in an Ed25519 PKCS8 document.
pub const PKCS8_PREFIX: [u8; 16] = [
	0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// Wraps a raw 32-byte Ed25519 public key in its SPKI DER encoding.
#[must_use]
pub fn wrap_public_spki(raw: &[u8; 32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(SPKI_PREFIX.len() + 32);
	out.extend_from_slice(&SPKI_PREFIX);
	out.extend_from_slice(raw);
	out
}

/// Extracts the raw 32-byte public key from an SPKI DER encoding.
pub fn unwrap_public_spki(der: &[u8]) -> Option<[u8; 32]> {
	if der.len() != SPKI_PREFIX.len() + 32 || der[..SPKI_PREFIX.len()] != SPKI_PREFIX {
		return None;
	}
	der[SPKI_PREFIX.len()..].try_into().ok()
}

/// Wraps a raw 32-byte Ed25519 private seed in its PKCS8 DER encoding.
#[must_use]
pub fn wrap_private_pkcs8(raw: &[u8; 32]) -> Vec<u8> {
	let mut out = Vec::with_capacity(PKCS8_PREFIX.len() + 32);
	out.extend_from_slice(&PKCS8_PREFIX);
	out.extend_from_slice(raw);
	out
}

/// Extracts the raw 32-byte private seed from a PKCS8 DER encoding.
pub fn unwrap_private_pkcs8(der: &[u8]) -> Option<[u8; 32]> {
	if der.len() != PKCS8_PREFIX.len() + 32 || der[..PKCS8_PREFIX.len()] != PKCS8_PREFIX {
		return None;
	}
	der[PKCS8_PREFIX.len()..].try_into().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spki_round_trip() {
		let raw = [7u8; 32];
		let der = wrap_public_spki(&raw);
		assert_eq!(unwrap_public_spki(&der), Some(raw));
	}

	#[test]
	fn pkcs8_round_trip() {
		let raw = [9u8; 32];
		let der = wrap_private_pkcs8(&raw);
		assert_eq!(unwrap_private_pkcs8(&der), Some(raw));
	}

	#[test]
	fn rejects_wrong_length() {
		assert_eq!(unwrap_public_spki(&[0u8; 10]), None);
	}
}
