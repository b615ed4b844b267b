use alloy::{
    primitives::Address,
    signers::local::{
        MnemonicBuilder,
        PrivateKeySigner,
        coins_bip39::English,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use serde::Deserialize;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::debug;

/// An encrypted Web3 Secret Storage (v3) keystore, as written by Foundry's
/// `cast wallet import` or geth.
#[derive(Clone, Debug)]
pub struct KeystoreEntry {
    pub name: String,
    pub path: PathBuf,
    /// Account address stored in clear text next to the ciphertext, when present.
    pub address: Option<Address>,
}

/// The unencrypted part of a keystore file.
#[derive(Deserialize)]
struct KeystoreHeader {
    #[serde(alias = "Crypto")]
    crypto: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    address: Option<String>,
}

impl KeystoreEntry {
    /// Returns `None` for files that are not v3 keystores.
    fn read(path: PathBuf) -> Option<Self> {
        let name = path.file_stem()?.to_str()?.to_owned();
        if name.starts_with('.') {
            return None;
        }
        let raw = fs::read(&path).ok()?;
        let header: KeystoreHeader = match serde_json::from_slice(&raw) {
            Ok(header) => header,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping non-keystore file");
                return None;
            }
        };
        if header.crypto.is_empty() {
            return None;
        }
        let address = header
            .address
            .and_then(|raw| raw.trim_start_matches("0x").parse::<Address>().ok());
        Some(Self {
            name,
            path,
            address,
        })
    }
}

pub fn default_keystore_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

/// `dir` with `~` expanded, or Foundry's keystore directory.
pub fn keystore_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => Ok(PathBuf::from(shellexpand::tilde(raw).into_owned())),
        None => default_keystore_dir(),
    }
}

/// Keystores in `dir`, sorted by name. Other files are ignored.
pub fn list_keystores(dir: &Path) -> Result<Vec<KeystoreEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut keystores = Vec::new();
    for entry in fs::read_dir(dir)
        .wrap_err_with(|| format!("Cannot list keystores in {}", dir.display()))?
    {
        let path = entry.wrap_err("Cannot read keystore directory entry")?.path();
        if path.is_file() {
            keystores.extend(KeystoreEntry::read(path));
        }
    }
    keystores.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(keystores)
}

pub fn find_keystore(dir: &Path, name: &str) -> Result<KeystoreEntry> {
    let keystores = list_keystores(dir)?;
    let known: Vec<_> = keystores.iter().map(|k| k.name.clone()).collect();
    keystores
        .into_iter()
        .find(|k| k.name == name)
        .ok_or_else(|| {
            eyre!(
                "No keystore named '{name}' in {} (found: {})",
                dir.display(),
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })
}

/// Prompts for the keystore password and decrypts the signing key.
pub fn unlock_keystore(keystore: &KeystoreEntry) -> Result<PrivateKeySigner> {
    let prompt = format!("Password for keystore '{}': ", keystore.name);
    let password = prompt_password(prompt).wrap_err("Failed to read keystore password")?;

    let secret = decrypt_key(&keystore.path, password.as_bytes())
        .map_err(|_| eyre!("Wrong password for keystore '{}'", keystore.name))?;

    let signer = signer_from_secret(&secret).ok_or_else(|| {
        eyre!(
            "Keystore '{}' holds neither a private key nor a mnemonic",
            keystore.name
        )
    })?;
    check_address(keystore, &signer)?;
    Ok(signer)
}

fn check_address(keystore: &KeystoreEntry, signer: &PrivateKeySigner) -> Result<()> {
    match keystore.address {
        Some(expected) if expected != signer.address() => Err(eyre!(
            "Keystore '{}' is labelled {expected} but decrypts to {}",
            keystore.name,
            signer.address()
        )),
        _ => Ok(()),
    }
}

/// Builds a signer from a hex private key, with or without `0x`.
pub fn signer_from_hex(raw: &str) -> Result<PrivateKeySigner> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x"))
        .wrap_err("Private key is not valid hex")?;
    if bytes.len() != 32 {
        return Err(eyre!(
            "Private key must be 32 bytes, got {}",
            bytes.len()
        ));
    }
    PrivateKeySigner::from_slice(&bytes).map_err(|_| eyre!("Private key is out of range"))
}

fn signer_from_secret(secret: &[u8]) -> Option<PrivateKeySigner> {
    if secret.len() == 32 {
        if let Ok(signer) = PrivateKeySigner::from_slice(secret) {
            return Some(signer);
        }
    }

    let mnemonic = std::str::from_utf8(secret).ok()?;
    if mnemonic.split_whitespace().count() < 12 {
        return None;
    }
    MnemonicBuilder::<English>::default()
        .phrase(mnemonic.trim())
        .index(0u32)
        .ok()?
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    const TEST_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn keystore_json(address: &str) -> String {
        format!(
            r#"{{"address":"{address}","crypto":{{"cipher":"aes-128-ctr","ciphertext":"00","kdf":"scrypt"}},"id":"1","version":3}}"#
        )
    }

    #[test]
    fn signer_from_hex__accepts_prefixed_key() {
        // given
        let raw = TEST_KEY;

        // when
        let signer = signer_from_hex(raw).unwrap();

        // then
        assert_eq!(signer.address().to_string(), TEST_ADDRESS);
    }

    #[test]
    fn signer_from_hex__rejects_short_key() {
        // given
        let raw = "0x1234";

        // when
        let result = signer_from_hex(raw);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn list_keystores__keeps_only_v3_keystores_sorted_by_name() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        let address = TEST_ADDRESS.trim_start_matches("0x").to_lowercase();
        fs::write(dir.path().join("zeta"), keystore_json(&address)).unwrap();
        fs::write(
            dir.path().join("alpha.json"),
            keystore_json(&address).replace("\"crypto\"", "\"Crypto\""),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "remember the password").unwrap();
        fs::write(dir.path().join("config.json"), r#"{"rpc":"http://localhost"}"#).unwrap();
        fs::write(dir.path().join(".hidden"), keystore_json(&address)).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        // when
        let keystores = list_keystores(dir.path()).unwrap();

        // then
        let names: Vec<_> = keystores.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        let expected: Address = TEST_ADDRESS.parse().unwrap();
        assert!(keystores.iter().all(|k| k.address == Some(expected)));
    }

    #[test]
    fn list_keystores__tolerates_missing_address() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        fs::write(
            dir.path().join("anon"),
            r#"{"crypto":{"cipher":"aes-128-ctr"},"version":3}"#,
        )
        .unwrap();

        // when
        let keystores = list_keystores(dir.path()).unwrap();

        // then
        assert_eq!(keystores.len(), 1);
        assert!(keystores[0].address.is_none());
    }

    #[test]
    fn find_keystore__lists_known_names_for_unknown_keystore() {
        // given
        let dir = TempDir::new("keystores").unwrap();
        fs::write(dir.path().join("deployer"), keystore_json("00")).unwrap();

        // when
        let err = find_keystore(dir.path(), "missing").unwrap_err();

        // then
        assert!(err.to_string().contains("found: deployer"));
    }

    #[test]
    fn check_address__rejects_keystore_labelled_with_other_account() {
        // given
        let keystore = KeystoreEntry {
            name: "deployer".to_string(),
            path: PathBuf::from("deployer"),
            address: Some(Address::repeat_byte(0x11)),
        };
        let signer = signer_from_hex(TEST_KEY).unwrap();

        // when
        let result = check_address(&keystore, &signer);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn signer_from_secret__derives_from_mnemonic() {
        // given
        let phrase = b"test test test test test test test test test test test junk";

        // when
        let signer = signer_from_secret(phrase).unwrap();

        // then
        assert_eq!(signer.address().to_string(), TEST_ADDRESS);
    }
}
