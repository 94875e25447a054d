//! Standard security handler (ISO 32000 §7.6.3–§7.6.4), revisions 2–4.
//!
//! The handler derives the file encryption key once per document (Algorithm
//! 2, empty password only), verifies it against `/U`, and then decrypts
//! strings and stream payloads per object (Algorithm 1). RC4 and
//! AES-128-CBC (`AESV2`) are the supported crypt methods; AES payloads carry
//! their IV as a 16-byte prefix. Documents that need a real password are
//! out of scope and reported as unsupported.

use std::collections::HashMap;
use std::fmt;

use aes::Aes128;
use cbc::Decryptor;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, KeyIvInit};
use log::debug;
use md5::{Digest, Md5};
use rc4::{KeyInit, Rc4, StreamCipher};

use crate::model::Object;

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CryptMethod {
    Identity,
    Rc4,
    AesV2,
}

/// Why a document could not be unlocked: the scheme is outside this
/// handler's scope, or the `/Encrypt` data itself is broken. A required
/// non-empty password counts as out of scope.
#[derive(Debug)]
pub(crate) enum CryptoError {
    Unsupported(String),
    Malformed(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, detail) = match self {
            CryptoError::Unsupported(detail) => ("encryption scheme not handled", detail),
            CryptoError::Malformed(detail) => ("broken /Encrypt data", detail),
        };
        write!(f, "{}: {}", kind, detail)
    }
}

impl std::error::Error for CryptoError {}

/// Everything derived from `/Encrypt` plus the verified file key.
#[derive(Debug, Clone)]
pub(crate) struct Encryption {
    encrypt_ref: Option<(u32, u16)>,
    revision: i32,
    key_len: usize,
    o: Vec<u8>,
    u: Vec<u8>,
    permissions: i32,
    file_id: Vec<u8>,
    encrypt_metadata: bool,
    stream_method: CryptMethod,
    string_method: CryptMethod,
    file_key: Vec<u8>,
}

impl Encryption {
    /// Build the handler state from the `/Encrypt` dictionary and attempt
    /// the empty-password unlock. The returned handler is ready for
    /// per-object decryption; a document that verifies against any other
    /// password is reported as unsupported.
    pub(crate) fn unlock(
        encrypt_dict: &HashMap<String, Object>,
        encrypt_ref: Option<(u32, u16)>,
        file_id: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        let filter = encrypt_dict
            .get("Filter")
            .and_then(Object::as_name)
            .ok_or_else(|| CryptoError::Malformed("missing /Filter".to_string()))?;
        if filter != "Standard" {
            return Err(CryptoError::Unsupported(format!(
                "security handler {}",
                filter
            )));
        }

        let revision = encrypt_dict
            .get("R")
            .and_then(Object::as_i64)
            .ok_or_else(|| CryptoError::Malformed("missing /R".to_string()))? as i32;
        if !matches!(revision, 2 | 3 | 4) {
            return Err(CryptoError::Unsupported(format!(
                "Standard handler revision R={}",
                revision
            )));
        }

        let version = encrypt_dict
            .get("V")
            .and_then(Object::as_i64)
            .unwrap_or(0) as i32;
        if !matches!(version, 1 | 2 | 4) {
            return Err(CryptoError::Unsupported(format!(
                "encryption version V={}",
                version
            )));
        }

        let o = match encrypt_dict.get("O") {
            Some(Object::String(v)) => v.clone(),
            _ => return Err(CryptoError::Malformed("missing /O".to_string())),
        };
        let u = match encrypt_dict.get("U") {
            Some(Object::String(v)) => v.clone(),
            _ => return Err(CryptoError::Malformed("missing /U".to_string())),
        };
        if o.len() < 32 || u.len() < 16 {
            return Err(CryptoError::Malformed(
                "unexpected /O or /U length".to_string(),
            ));
        }

        let permissions = encrypt_dict
            .get("P")
            .and_then(Object::as_i64)
            .ok_or_else(|| CryptoError::Malformed("missing /P".to_string()))?;
        let permissions = i32::try_from(permissions)
            .map_err(|_| CryptoError::Malformed("invalid /P value".to_string()))?;

        if file_id.is_empty() {
            return Err(CryptoError::Malformed(
                "missing file identifier (/ID)".to_string(),
            ));
        }

        let key_len_bits = encrypt_dict
            .get("Length")
            .and_then(Object::as_i64)
            .unwrap_or(if revision == 2 { 40 } else { 128 });
        if key_len_bits <= 0 || key_len_bits % 8 != 0 {
            return Err(CryptoError::Malformed("invalid /Length".to_string()));
        }
        let key_len = (key_len_bits / 8) as usize;
        if key_len == 0 || key_len > 16 {
            return Err(CryptoError::Unsupported(
                "key length beyond 128 bits".to_string(),
            ));
        }
        let key_len = if version == 1 { 5 } else { key_len };

        let encrypt_metadata = encrypt_dict
            .get("EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);

        let (stream_method, string_method) = if version == 4 {
            let cf = encrypt_dict.get("CF").and_then(Object::as_dict);
            let stmf = encrypt_dict
                .get("StmF")
                .and_then(Object::as_name)
                .unwrap_or("Identity");
            let strf = encrypt_dict
                .get("StrF")
                .and_then(Object::as_name)
                .unwrap_or("Identity");
            (crypt_method(stmf, cf)?, crypt_method(strf, cf)?)
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };
        if (stream_method == CryptMethod::AesV2 || string_method == CryptMethod::AesV2)
            && key_len != 16
        {
            return Err(CryptoError::Malformed(
                "AESV2 requires a 128-bit key".to_string(),
            ));
        }
        debug!(
            "standard security handler: R={} V={} streams={:?} strings={:?}",
            revision, version, stream_method, string_method
        );

        let mut handler = Self {
            encrypt_ref,
            revision,
            key_len,
            o,
            u,
            permissions,
            file_id,
            encrypt_metadata,
            stream_method,
            string_method,
            file_key: Vec::new(),
        };
        let file_key = handler.derive_empty_password_key();
        if !handler.validates_user_key(&file_key) {
            return Err(CryptoError::Unsupported(
                "encrypted PDF requires a password".to_string(),
            ));
        }
        handler.file_key = file_key;
        Ok(handler)
    }

    pub(crate) fn encrypt_ref(&self) -> Option<(u32, u16)> {
        self.encrypt_ref
    }

    pub(crate) fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub(crate) fn decrypt_string(
        &self,
        obj_num: u32,
        gen_num: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_bytes(self.string_method, obj_num, gen_num, data)
    }

    pub(crate) fn decrypt_stream(
        &self,
        obj_num: u32,
        gen_num: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_bytes(self.stream_method, obj_num, gen_num, data)
    }

    fn decrypt_bytes(
        &self,
        method: CryptMethod,
        obj_num: u32,
        gen_num: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let mut out = data.to_vec();
                let obj_key = self.object_key(obj_num, gen_num, false);
                rc4_apply(&obj_key, &mut out)?;
                Ok(out)
            }
            CryptMethod::AesV2 => {
                if data.len() < 16 {
                    return Err(CryptoError::Malformed(
                        "AESV2 payload is missing its IV".to_string(),
                    ));
                }
                let obj_key = self.object_key(obj_num, gen_num, true);
                let iv = &data[..16];
                let mut encrypted = data[16..].to_vec();
                let decryptor = Decryptor::<Aes128>::new_from_slices(&obj_key, iv)
                    .map_err(|_| CryptoError::Malformed("invalid AES key/iv".to_string()))?;
                let plaintext = decryptor
                    .decrypt_padded_mut::<Pkcs7>(&mut encrypted)
                    .map_err(|_| CryptoError::Malformed("invalid AESV2 padding".to_string()))?;
                Ok(plaintext.to_vec())
            }
        }
    }

    /// Algorithm 2 with the empty password, whose padded form is the
    /// padding constant itself.
    fn derive_empty_password_key(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(32 + self.o.len() + 8 + self.file_id.len());
        input.extend_from_slice(&PASSWORD_PADDING);
        input.extend_from_slice(&self.o);
        input.extend_from_slice(&self.permissions.to_le_bytes());
        input.extend_from_slice(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        }

        let mut digest = md5_sum(&input).to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5_sum(&digest[..self.key_len]).to_vec();
            }
        }
        digest[..self.key_len].to_vec()
    }

    fn validates_user_key(&self, file_key: &[u8]) -> bool {
        if self.revision == 2 {
            if self.u.len() < 32 {
                return false;
            }
            let mut value = PASSWORD_PADDING.to_vec();
            if rc4_apply(file_key, &mut value).is_err() {
                return false;
            }
            return value == self.u[..32];
        }

        let mut input = Vec::with_capacity(32 + self.file_id.len());
        input.extend_from_slice(&PASSWORD_PADDING);
        input.extend_from_slice(&self.file_id);
        let mut value = md5_sum(&input).to_vec();
        if rc4_apply(file_key, &mut value).is_err() {
            return false;
        }
        for round in 1..=19u8 {
            let key = xor_key(file_key, round);
            if rc4_apply(&key, &mut value).is_err() {
                return false;
            }
        }
        value[..16] == self.u[..16]
    }

    /// Algorithm 1: the per-object key.
    fn object_key(&self, obj_num: u32, gen_num: u16, aes_salt: bool) -> Vec<u8> {
        let mut material = Vec::with_capacity(self.file_key.len() + 9);
        material.extend_from_slice(&self.file_key);
        material.extend_from_slice(&obj_num.to_le_bytes()[..3]);
        material.extend_from_slice(&gen_num.to_le_bytes());
        if aes_salt {
            material.extend_from_slice(b"sAlT");
        }
        let digest = md5_sum(&material);
        let key_len = (self.file_key.len() + 5).min(16);
        digest[..key_len].to_vec()
    }
}

fn crypt_method(
    filter_name: &str,
    cf_dict: Option<&HashMap<String, Object>>,
) -> Result<CryptMethod, CryptoError> {
    if filter_name == "Identity" {
        return Ok(CryptMethod::Identity);
    }
    let cf_dict =
        cf_dict.ok_or_else(|| CryptoError::Malformed("missing /CF dictionary".to_string()))?;
    let cf = cf_dict
        .get(filter_name)
        .and_then(Object::as_dict)
        .ok_or_else(|| CryptoError::Malformed(format!("missing /CF entry {}", filter_name)))?;
    match cf.get("CFM").and_then(Object::as_name).unwrap_or("None") {
        "None" => Ok(CryptMethod::Identity),
        "V2" => Ok(CryptMethod::Rc4),
        "AESV2" => Ok(CryptMethod::AesV2),
        other => Err(CryptoError::Unsupported(format!(
            "crypt filter method {}",
            other
        ))),
    }
}

fn md5_sum(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn xor_key(key: &[u8], value: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ value).collect()
}

fn rc4_apply(key: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
    macro_rules! apply_with {
        ($size:ty) => {{
            let mut cipher = Rc4::<$size>::new_from_slice(key)
                .map_err(|_| CryptoError::Malformed("invalid RC4 key".to_string()))?;
            cipher.apply_keystream(data);
            Ok(())
        }};
    }
    match key.len() {
        1 => apply_with!(rc4::consts::U1),
        2 => apply_with!(rc4::consts::U2),
        3 => apply_with!(rc4::consts::U3),
        4 => apply_with!(rc4::consts::U4),
        5 => apply_with!(rc4::consts::U5),
        6 => apply_with!(rc4::consts::U6),
        7 => apply_with!(rc4::consts::U7),
        8 => apply_with!(rc4::consts::U8),
        9 => apply_with!(rc4::consts::U9),
        10 => apply_with!(rc4::consts::U10),
        11 => apply_with!(rc4::consts::U11),
        12 => apply_with!(rc4::consts::U12),
        13 => apply_with!(rc4::consts::U13),
        14 => apply_with!(rc4::consts::U14),
        15 => apply_with!(rc4::consts::U15),
        16 => apply_with!(rc4::consts::U16),
        other => Err(CryptoError::Malformed(format!(
            "unsupported RC4 key length {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::Encryptor;
    use cipher::BlockEncryptMut;

    fn handler_with(
        revision: i32,
        key_len: usize,
        method: CryptMethod,
        file_key: Vec<u8>,
    ) -> Encryption {
        Encryption {
            encrypt_ref: None,
            revision,
            key_len,
            o: vec![0; 32],
            u: vec![0; 32],
            permissions: -4,
            file_id: vec![1, 2, 3, 4, 5, 6, 7, 8],
            encrypt_metadata: true,
            stream_method: method,
            string_method: method,
            file_key,
        }
    }

    #[test]
    fn rc4_roundtrip() {
        let key = b"abcde";
        let plain = b"hello world";
        let mut data = plain.to_vec();
        rc4_apply(key, &mut data).expect("encrypt");
        assert_ne!(data, plain);
        rc4_apply(key, &mut data).expect("decrypt");
        assert_eq!(data, plain);
    }

    #[test]
    fn rc4_object_decryption_roundtrips() {
        let handler = handler_with(3, 16, CryptMethod::Rc4, (0u8..16).collect());
        let plain = b"BT (secret) Tj ET";
        let obj_key = handler.object_key(9, 0, false);
        let mut encrypted = plain.to_vec();
        rc4_apply(&obj_key, &mut encrypted).expect("encrypt");

        let decrypted = handler.decrypt_stream(9, 0, &encrypted).expect("decrypt");
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn aesv2_payload_with_iv_prefix_roundtrips() {
        let handler = handler_with(4, 16, CryptMethod::AesV2, (0u8..16).collect());
        let obj_key = handler.object_key(42, 0, true);
        assert_eq!(obj_key.len(), 16);

        let plaintext = b"BT /F1 12 Tf (Hello) Tj ET";
        let iv = [7u8; 16];
        let mut padded = vec![0u8; plaintext.len() + 16];
        padded[..plaintext.len()].copy_from_slice(plaintext);
        let encryptor = Encryptor::<Aes128>::new_from_slices(&obj_key, &iv).expect("cipher");
        let ciphertext = encryptor
            .encrypt_padded_mut::<Pkcs7>(&mut padded, plaintext.len())
            .expect("pad");

        let mut payload = iv.to_vec();
        payload.extend_from_slice(ciphertext);
        let decrypted = handler.decrypt_stream(42, 0, &payload).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn aesv2_without_iv_is_malformed() {
        let handler = handler_with(4, 16, CryptMethod::AesV2, (0u8..16).collect());
        let err = handler.decrypt_stream(1, 0, b"short");
        assert!(matches!(err, Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn object_key_truncates_to_sixteen_bytes() {
        let handler = handler_with(3, 16, CryptMethod::Rc4, vec![0xAA; 16]);
        assert_eq!(handler.object_key(1, 0, false).len(), 16);

        let short = handler_with(2, 5, CryptMethod::Rc4, vec![0xAA; 5]);
        assert_eq!(short.object_key(1, 0, false).len(), 10);
    }

    #[test]
    fn non_standard_filter_is_unsupported() {
        let dict = HashMap::from([
            ("Filter".to_string(), Object::Name("AcmeCrypt".to_string())),
            ("R".to_string(), Object::Integer(3)),
        ]);
        let err = Encryption::unlock(&dict, None, vec![1]);
        assert!(matches!(err, Err(CryptoError::Unsupported(_))));
    }

    #[test]
    fn revision_five_is_unsupported() {
        let dict = HashMap::from([
            ("Filter".to_string(), Object::Name("Standard".to_string())),
            ("R".to_string(), Object::Integer(5)),
            ("V".to_string(), Object::Integer(5)),
        ]);
        let err = Encryption::unlock(&dict, None, vec![1]);
        assert!(matches!(err, Err(CryptoError::Unsupported(_))));
    }
}
