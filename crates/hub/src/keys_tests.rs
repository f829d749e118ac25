// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ring::signature::{UnparsedPublicKey, ED25519};

use super::*;

#[test]
fn generates_and_persists_a_keypair_on_first_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = KeyStore::load_or_generate(dir.path())?;

    assert!(dir.path().join("id_ed25519").exists());
    assert!(dir.path().join("id_ed25519.pub").exists());
    assert!(store.public_key_openssh().starts_with("ssh-ed25519 "));
    assert!(store.public_key_openssh().ends_with(" beszel-hub"));
    Ok(())
}

#[test]
fn reloads_the_same_identity_on_second_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let first = KeyStore::load_or_generate(dir.path())?;
    let second = KeyStore::load_or_generate(dir.path())?;
    assert_eq!(first.public_key_openssh(), second.public_key_openssh());
    Ok(())
}

#[test]
fn signature_verifies_against_the_public_key() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = KeyStore::load_or_generate(dir.path())?;
    let nonce = generate_nonce();
    let signature = store.sign(&nonce);

    let raw_pubkey = extract_raw_pubkey(store.public_key_openssh());
    let public_key = UnparsedPublicKey::new(&ED25519, raw_pubkey.as_slice());
    assert!(public_key.verify(&nonce, &signature).is_ok());
    Ok(())
}

#[test]
fn signature_rejects_a_tampered_nonce() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = KeyStore::load_or_generate(dir.path())?;
    let nonce = generate_nonce();
    let signature = store.sign(&nonce);

    let mut tampered = nonce;
    tampered[0] ^= 0xff;

    let raw_pubkey = extract_raw_pubkey(store.public_key_openssh());
    let public_key = UnparsedPublicKey::new(&ED25519, raw_pubkey.as_slice());
    assert!(public_key.verify(&tampered, &signature).is_err());
    Ok(())
}

/// Pull the raw 32-byte Ed25519 public key back out of the OpenSSH blob,
/// mirroring how an agent would parse the pinned hub public key.
fn extract_raw_pubkey(openssh: &str) -> Vec<u8> {
    let b64 = openssh.split(' ').nth(1).expect("openssh key has a base64 field");
    let blob = BASE64.decode(b64).expect("valid base64");
    // u32 type-length, type bytes, u32 key-length, key bytes.
    let type_len = u32::from_be_bytes(blob[0..4].try_into().expect("4 bytes")) as usize;
    let key_len_start = 4 + type_len;
    let key_len = u32::from_be_bytes(
        blob[key_len_start..key_len_start + 4].try_into().expect("4 bytes"),
    ) as usize;
    let key_start = key_len_start + 4;
    blob[key_start..key_start + key_len].to_vec()
}
