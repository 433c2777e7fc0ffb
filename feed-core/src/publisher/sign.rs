use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use std::fs;
use std::path::Path;

// Public-key only. Replace with the production public key before cutting
// a release; mirrors verify every bundle against this key.
const FEED_PUBKEY_B64URL: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Environment override for the verification key (base64url, 32
/// bytes). Lets staging mirrors track a non-production publisher.
pub const FEED_PUBKEY_ENV: &str = "PHISHGUARD_FEED_PUBKEY";

pub fn verify_bundle_signature(bundle_json: &[u8], sig_bytes: &[u8]) -> anyhow::Result<()> {
  if sig_bytes.len() != 64 {
    anyhow::bail!("invalid signature length (expected 64 bytes)");
  }
  let mut sig_arr = [0u8; 64];
  sig_arr.copy_from_slice(sig_bytes);
  let sig = Signature::from_bytes(&sig_arr);

  let key = embedded_verifying_key().context("load embedded public key")?;
  key
    .verify_strict(bundle_json, &sig)
    .context("signature verification failed")?;
  Ok(())
}

/// Verify against the key paired with `key`, not the embedded one.
/// Used by `publish` so a freshly signed bundle can be checked before
/// it is installed under dist/.
pub fn verify_with_key(
  key: &SigningKey,
  bundle_json: &[u8],
  sig_bytes: &[u8],
) -> anyhow::Result<()> {
  if sig_bytes.len() != 64 {
    anyhow::bail!("invalid signature length (expected 64 bytes)");
  }
  let mut sig_arr = [0u8; 64];
  sig_arr.copy_from_slice(sig_bytes);
  let sig = Signature::from_bytes(&sig_arr);
  key
    .verifying_key()
    .verify_strict(bundle_json, &sig)
    .context("signature verification failed")?;
  Ok(())
}

pub fn sign_bundle(key: &SigningKey, bundle_json: &[u8]) -> Vec<u8> {
  key.sign(bundle_json).to_bytes().to_vec()
}

/// The key file holds a 32-byte ed25519 seed, either raw or base64url
/// (no padding). The file never leaves the publishing machine.
pub fn load_signing_key(path: &Path) -> anyhow::Result<SigningKey> {
  let raw = fs::read(path).with_context(|| format!("read signing key {}", path.display()))?;

  let seed = if raw.len() == 32 {
    raw
  } else {
    let text =
      std::str::from_utf8(&raw).context("signing key must be 32 raw bytes or base64url text")?;
    URL_SAFE_NO_PAD
      .decode(text.trim().as_bytes())
      .context("decode signing key base64url")?
  };

  if seed.len() != 32 {
    anyhow::bail!("signing key seed must be 32 bytes (ed25519)");
  }
  let mut arr = [0u8; 32];
  arr.copy_from_slice(&seed);
  Ok(SigningKey::from_bytes(&arr))
}

pub fn encode_sig_base64url(sig_bytes: &[u8]) -> String {
  URL_SAFE_NO_PAD.encode(sig_bytes)
}

pub fn decode_sig_base64url(text: &str) -> anyhow::Result<Vec<u8>> {
  URL_SAFE_NO_PAD
    .decode(text.trim().as_bytes())
    .context("decode signature base64url")
}

pub fn encode_pubkey_b64url(key: &VerifyingKey) -> String {
  URL_SAFE_NO_PAD.encode(key.to_bytes())
}

fn embedded_verifying_key() -> anyhow::Result<VerifyingKey> {
  let encoded = match std::env::var(FEED_PUBKEY_ENV) {
    Ok(v) if !v.trim().is_empty() => v,
    _ => FEED_PUBKEY_B64URL.to_string(),
  };
  let pk = URL_SAFE_NO_PAD
    .decode(encoded.trim().as_bytes())
    .context("decode verification public key base64url")?;
  if pk.len() != 32 {
    anyhow::bail!("embedded public key must be 32 bytes (ed25519)");
  }
  let mut arr = [0u8; 32];
  arr.copy_from_slice(&pk);
  Ok(VerifyingKey::from_bytes(&arr)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
  }

  #[test]
  fn sign_and_verify_round_trip() {
    let key = test_key();
    let payload = br#"{"data_version":3}"#;

    let sig = sign_bundle(&key, payload);
    assert_eq!(sig.len(), 64);
    verify_with_key(&key, payload, &sig).unwrap();
  }

  #[test]
  fn tampered_payload_fails_verification() {
    let key = test_key();
    let sig = sign_bundle(&key, b"original");
    assert!(verify_with_key(&key, b"tampered", &sig).is_err());
  }

  #[test]
  fn sig_base64url_round_trip() {
    let key = test_key();
    let sig = sign_bundle(&key, b"payload");
    let text = encode_sig_base64url(&sig);
    assert_eq!(decode_sig_base64url(&text).unwrap(), sig);
  }

  #[test]
  fn signing_key_loads_raw_and_base64url_seeds() {
    let dir = tempfile::tempdir().unwrap();

    let raw_path = dir.path().join("key.raw");
    std::fs::write(&raw_path, [7u8; 32]).unwrap();
    let from_raw = load_signing_key(&raw_path).unwrap();

    let b64_path = dir.path().join("key.b64");
    std::fs::write(&b64_path, URL_SAFE_NO_PAD.encode([7u8; 32])).unwrap();
    let from_b64 = load_signing_key(&b64_path).unwrap();

    assert_eq!(
      from_raw.verifying_key().to_bytes(),
      from_b64.verifying_key().to_bytes()
    );
  }

  #[test]
  fn short_seed_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.short");
    std::fs::write(&path, URL_SAFE_NO_PAD.encode([7u8; 16])).unwrap();
    assert!(load_signing_key(&path).is_err());
  }
}
