mod common;

use aes::Aes128;
use cbc::Encryptor;
use cipher::block_padding::Pkcs7;
use cipher::{BlockEncryptMut, KeyIvInit};
use common::{PdfBuilder, HELVETICA_FONT};
use glean::{Document, Error};
use md5::{Digest, Md5};
use rc4::{consts::U16, KeyInit, Rc4, StreamCipher};

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const PERMISSIONS: i32 = -44;

fn md5_sum(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn rc4_16(key: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Rc4::<U16>::new_from_slice(key).expect("rc4 key");
    cipher.apply_keystream(data);
}

fn xor_key(key: &[u8; 16], value: u8) -> [u8; 16] {
    let mut out = *key;
    for byte in out.iter_mut() {
        *byte ^= value;
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

struct HandlerParams {
    o: Vec<u8>,
    u: Vec<u8>,
    file_key: [u8; 16],
    id: Vec<u8>,
}

/// Algorithm 3 (forward), Algorithm 2, and Algorithm 5 for the empty user
/// and owner passwords with a 128-bit key.
fn derive_params() -> HandlerParams {
    let id: Vec<u8> = (1u8..=16).collect();

    let mut owner_digest = md5_sum(&PASSWORD_PADDING);
    for _ in 0..50 {
        owner_digest = md5_sum(&owner_digest);
    }
    let mut o = PASSWORD_PADDING.to_vec();
    for round in 0..=19u8 {
        rc4_16(&xor_key(&owner_digest, round), &mut o);
    }

    let mut key_input = Vec::new();
    key_input.extend_from_slice(&PASSWORD_PADDING);
    key_input.extend_from_slice(&o);
    key_input.extend_from_slice(&PERMISSIONS.to_le_bytes());
    key_input.extend_from_slice(&id);
    let mut file_key = md5_sum(&key_input);
    for _ in 0..50 {
        file_key = md5_sum(&file_key);
    }

    let mut u_input = PASSWORD_PADDING.to_vec();
    u_input.extend_from_slice(&id);
    let mut u = md5_sum(&u_input).to_vec();
    rc4_16(&file_key, &mut u);
    for round in 1..=19u8 {
        rc4_16(&xor_key(&file_key, round), &mut u);
    }
    u.extend_from_slice(&[0u8; 16]);

    HandlerParams {
        o,
        u,
        file_key,
        id,
    }
}

fn object_key(file_key: &[u8; 16], obj_num: u32, gen_num: u16, aes: bool) -> [u8; 16] {
    let mut material = Vec::new();
    material.extend_from_slice(file_key);
    material.extend_from_slice(&obj_num.to_le_bytes()[..3]);
    material.extend_from_slice(&gen_num.to_le_bytes());
    if aes {
        material.extend_from_slice(b"sAlT");
    }
    md5_sum(&material)
}

fn build_encrypted_pdf(params: &HandlerParams, encrypt_dict: &str, content: Vec<u8>) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>",
        )
        .stream_object(4, "", &content)
        .object(5, HELVETICA_FONT)
        .object(6, encrypt_dict)
        .trailer_extra(&format!(
            "/Encrypt 6 0 R /ID [<{0}> <{0}>]",
            hex(&params.id)
        ));
    builder.build(1)
}

fn rc4_encrypted_pdf(params: &HandlerParams, plaintext: &str) -> Vec<u8> {
    let mut payload = plaintext.as_bytes().to_vec();
    rc4_16(&object_key(&params.file_key, 4, 0, false), &mut payload);
    let dict = format!(
        "<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O <{}> /U <{}> >>",
        PERMISSIONS,
        hex(&params.o),
        hex(&params.u)
    );
    build_encrypted_pdf(params, &dict, payload)
}

fn aes_encrypted_pdf(params: &HandlerParams, plaintext: &str) -> Vec<u8> {
    let iv = [0x42u8; 16];
    let key = object_key(&params.file_key, 4, 0, true);
    let mut buffer = vec![0u8; plaintext.len() + 16];
    buffer[..plaintext.len()].copy_from_slice(plaintext.as_bytes());
    let encryptor = Encryptor::<Aes128>::new_from_slices(&key, &iv).expect("cipher");
    let ciphertext = encryptor
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .expect("pad");

    let mut payload = iv.to_vec();
    payload.extend_from_slice(ciphertext);
    let dict = format!(
        "<< /Filter /Standard /V 4 /R 4 /Length 128 /P {} /O <{}> /U <{}> \
         /CF << /StdCF << /CFM /AESV2 /Length 16 >> >> /StmF /StdCF /StrF /StdCF >>",
        PERMISSIONS,
        hex(&params.o),
        hex(&params.u)
    );
    build_encrypted_pdf(params, &dict, payload)
}

#[test]
fn rc4_document_decrypts_with_the_empty_password() {
    let params = derive_params();
    let bytes = rc4_encrypted_pdf(&params, "BT /F1 12 Tf 72 700 Td (Sealed RC4 text) Tj ET");
    let doc = Document::parse(bytes).expect("parse");
    assert_eq!(doc.text(), "Sealed RC4 text");
}

#[test]
fn aes_128_document_decrypts_with_the_empty_password() {
    let params = derive_params();
    let bytes = aes_encrypted_pdf(&params, "BT /F1 12 Tf 72 700 Td (Sealed AES text) Tj ET");
    let doc = Document::parse(bytes).expect("parse");
    assert_eq!(doc.text(), "Sealed AES text");
}

#[test]
fn password_protected_document_is_unsupported_not_malformed() {
    let mut params = derive_params();
    // A /U that validates against some non-empty password only.
    params.u[0] ^= 0xFF;
    let bytes = rc4_encrypted_pdf(&params, "BT /F1 12 Tf 72 700 Td (locked) Tj ET");
    let err = Document::parse(bytes).expect_err("must fail");
    assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
}

#[test]
fn supplied_passwords_are_inert_for_protected_documents() {
    // The password option is reserved: a protected document stays
    // unsupported even when a caller passes one.
    let mut params = derive_params();
    params.u[0] ^= 0xFF;
    let bytes = rc4_encrypted_pdf(&params, "BT /F1 12 Tf 72 700 Td (locked) Tj ET");
    let options = glean::LoadOptions {
        password: Some(b"letmein".to_vec()),
        ..glean::LoadOptions::default()
    };
    let err = Document::parse_with_options(bytes, options).expect_err("must fail");
    assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
}

#[test]
fn missing_file_id_is_unsupported() {
    let params = derive_params();
    let dict = format!(
        "<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O <{}> /U <{}> >>",
        PERMISSIONS,
        hex(&params.o),
        hex(&params.u)
    );
    let mut builder = PdfBuilder::new();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(6, &dict)
        .trailer_extra("/Encrypt 6 0 R");
    let err = Document::parse(builder.build(1)).expect_err("must fail");
    assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
}

#[test]
fn non_standard_security_handler_is_unsupported() {
    let params = derive_params();
    let dict = "<< /Filter /AcmeSecure /V 2 /R 3 >>".to_string();
    let bytes = build_encrypted_pdf(&params, &dict, b"BT ET".to_vec());
    let err = Document::parse(bytes).expect_err("must fail");
    assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
}

#[test]
fn revision_five_is_unsupported() {
    let params = derive_params();
    let dict = format!(
        "<< /Filter /Standard /V 5 /R 5 /Length 256 /P {} /O <{}> /U <{}> >>",
        PERMISSIONS,
        hex(&params.o),
        hex(&params.u)
    );
    let bytes = build_encrypted_pdf(&params, &dict, b"BT ET".to_vec());
    let err = Document::parse(bytes).expect_err("must fail");
    assert!(matches!(err, Error::Unsupported(_)), "got {:?}", err);
}
