// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ed25519 keypair load/generate, OpenSSH public-key encoding, and the
//! signer used for agent identity challenges (§4.2, §6 "Filesystem layout").

use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Holds the hub's long-lived Ed25519 identity.
pub struct KeyStore {
    keypair: Ed25519KeyPair,
    public_openssh: String,
}

impl KeyStore {
    /// Load `<data_dir>/id_ed25519`, generating and persisting a new keypair
    /// (mode 0600) plus its `.pub` companion if none exists yet.
    pub fn load_or_generate(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let key_path = data_dir.join("id_ed25519");
        let pub_path = data_dir.join("id_ed25519.pub");

        let pkcs8_bytes = if key_path.exists() {
            std::fs::read(&key_path)
                .with_context(|| format!("reading {}", key_path.display()))?
        } else {
            let rng = SystemRandom::new();
            let doc = Ed25519KeyPair::generate_pkcs8(&rng)
                .map_err(|_| anyhow::anyhow!("ed25519 key generation failed"))?;
            let bytes = doc.as_ref().to_vec();
            write_private_key(&key_path, &bytes)?;
            bytes
        };

        let keypair = Ed25519KeyPair::from_pkcs8(&pkcs8_bytes)
            .map_err(|e| anyhow::anyhow!("invalid ed25519 private key: {e}"))?;
        let public_openssh = encode_openssh_public_key(keypair.public_key().as_ref());

        if !pub_path.exists() {
            std::fs::write(&pub_path, format!("{public_openssh}\n"))
                .with_context(|| format!("writing {}", pub_path.display()))?;
        }

        Ok(Self { keypair, public_openssh })
    }

    /// OpenSSH wire-format public key, e.g. `ssh-ed25519 AAAA... beszel-hub`.
    /// Agents pin this at install time to verify identity challenges.
    pub fn public_key_openssh(&self) -> &str {
        &self.public_openssh
    }

    /// Sign `message` (typically a random nonce) with the hub's private key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.keypair.sign(message).as_ref().to_vec()
    }
}

/// Generate a random 32-byte nonce for an identity challenge.
pub fn generate_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(unix)]
fn write_private_key(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("setting permissions on {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private_key(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn encode_openssh_public_key(raw: &[u8]) -> String {
    const KEY_TYPE: &[u8] = b"ssh-ed25519";

    let mut blob = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + raw.len());
    blob.extend_from_slice(&(KEY_TYPE.len() as u32).to_be_bytes());
    blob.extend_from_slice(KEY_TYPE);
    blob.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    blob.extend_from_slice(raw);

    format!("ssh-ed25519 {} beszel-hub", BASE64.encode(blob))
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
