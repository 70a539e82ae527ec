use crate::plugin::{Phase, Plugin, PluginContext, PluginInstance, PluginResult};
use crate::transform::{navigate_mut, parse_path, PathSeg};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::Deserialize;
use serde_json::Value;

pub const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    Base64,
    Hex,
}

fn encode(bytes: &[u8], encoding: FieldEncoding) -> String {
    match encoding {
        FieldEncoding::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        FieldEncoding::Hex => hex::encode(bytes),
    }
}

fn decode(text: &str, encoding: FieldEncoding) -> Option<Vec<u8>> {
    match encoding {
        FieldEncoding::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.decode(text).ok()
        }
        FieldEncoding::Hex => hex::decode(text).ok(),
    }
}

/// Encrypt one leaf value. Prepends a fresh random 12-byte nonce to the
/// ciphertext, then encodes the whole thing (nonce || ciphertext) as
/// text. Every call draws a new nonce — fields are never batch-encrypted
/// under one nonce.
pub fn encrypt_field(plaintext: &[u8], key: &Key<Aes256Gcm>, encoding: FieldEncoding) -> anyhow::Result<String> {
    let cipher = Aes256Gcm::new(key);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("field encryption failed: {e}"))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(encode(&out, encoding))
}

/// Reverse `encrypt_field`. Returns `None` on any decode/auth failure —
/// callers must leave the field untouched rather than surface a partial
/// value, per the per-field isolation invariant: a bad field never
/// corrupts the rest of the message.
pub fn decrypt_field(encoded: &str, key: &Key<Aes256Gcm>, encoding: FieldEncoding) -> Option<Vec<u8>> {
    let raw = decode(encoded, encoding)?;
    if raw.len() < NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher.decrypt(nonce, ciphertext).ok()
}

pub fn key_from_bytes(bytes: &[u8; 32]) -> Key<Aes256Gcm> {
    *Key::<Aes256Gcm>::from_slice(bytes)
}

#[derive(Debug, Deserialize)]
struct FieldEncryptionConfig {
    /// 32-byte AEAD key, hex-encoded.
    key_hex: String,
    #[serde(default = "default_field_encoding")]
    encoding: FieldEncoding,
    /// Dotted request-body paths to encrypt before proxying upstream.
    #[serde(default)]
    encrypt_fields: Vec<String>,
    /// Dotted response-body paths to decrypt before returning to the client.
    #[serde(default)]
    decrypt_fields: Vec<String>,
}

fn default_field_encoding() -> FieldEncoding {
    FieldEncoding::Base64
}

pub struct FieldEncryptionPlugin;

impl Plugin for FieldEncryptionPlugin {
    fn name(&self) -> &str {
        "field-encryption"
    }

    fn priority(&self) -> i32 {
        400
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::BeforeProxy, Phase::BodyFilter]
    }

    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>> {
        let cfg: FieldEncryptionConfig =
            serde_json::from_value(config.clone()).map_err(|e| anyhow::anyhow!("field-encryption config error: {e}"))?;
        let key_bytes: Vec<u8> = hex::decode(&cfg.key_hex).map_err(|e| anyhow::anyhow!("field-encryption key_hex invalid: {e}"))?;
        let key_arr: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("field-encryption key_hex must decode to exactly 32 bytes"))?;
        Ok(Box::new(FieldEncryptionInstance {
            key: key_from_bytes(&key_arr),
            encoding: cfg.encoding,
            encrypt_paths: cfg.encrypt_fields.iter().map(|p| parse_path(p)).collect(),
            decrypt_paths: cfg.decrypt_fields.iter().map(|p| parse_path(p)).collect(),
        }))
    }
}

struct FieldEncryptionInstance {
    key: Key<Aes256Gcm>,
    encoding: FieldEncoding,
    encrypt_paths: Vec<Vec<PathSeg>>,
    decrypt_paths: Vec<Vec<PathSeg>>,
}

impl FieldEncryptionInstance {
    /// Mutate every string leaf reachable by `paths`, applying `f`. A
    /// failure for one field (bad decode, auth failure) is counted and
    /// skipped; it never aborts the other fields.
    fn transform_fields(body: &mut Value, paths: &[Vec<PathSeg>], f: impl Fn(&str) -> Option<Value>) -> bool {
        let mut changed = false;
        for path in paths {
            if let Some(target) = navigate_mut(body, path) {
                if let Value::String(s) = target {
                    if let Some(replacement) = f(s) {
                        *target = replacement;
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

impl PluginInstance for FieldEncryptionInstance {
    fn name(&self) -> &str {
        "field-encryption"
    }

    fn priority(&self) -> i32 {
        400
    }

    fn before_proxy(&self, ctx: &mut PluginContext) -> PluginResult {
        if self.encrypt_paths.is_empty() {
            return PluginResult::Continue;
        }
        let Some(body) = ctx.request_body.take() else {
            return PluginResult::Continue;
        };
        let Ok(mut parsed) = serde_json::from_slice::<Value>(&body) else {
            ctx.request_body = Some(body);
            return PluginResult::Continue;
        };
        Self::transform_fields(&mut parsed, &self.encrypt_paths, |plain| {
            encrypt_field(plain.as_bytes(), &self.key, self.encoding).ok().map(Value::String)
        });
        ctx.request_body = serde_json::to_vec(&parsed).ok().or(Some(body));
        PluginResult::Continue
    }

    fn body_filter(&self, ctx: &mut PluginContext) -> PluginResult {
        if self.decrypt_paths.is_empty() {
            return PluginResult::Continue;
        }
        let Some(body) = ctx.response_body.take() else {
            return PluginResult::Continue;
        };
        let Ok(mut parsed) = serde_json::from_slice::<Value>(&body) else {
            ctx.response_body = Some(body);
            return PluginResult::Continue;
        };
        Self::transform_fields(&mut parsed, &self.decrypt_paths, |encoded| {
            let plaintext = decrypt_field(encoded, &self.key, self.encoding)?;
            // If the plaintext is itself valid JSON, reinsert as JSON;
            // otherwise as a plain string.
            Some(match serde_json::from_slice::<Value>(&plaintext) {
                Ok(v) => v,
                Err(_) => Value::String(String::from_utf8_lossy(&plaintext).into_owned()),
            })
        });
        ctx.response_body = serde_json::to_vec(&parsed).ok().or(Some(body));
        PluginResult::Continue
    }
}
