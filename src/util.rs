//! Identifier generation, hashing and filename formatting helpers.

use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use base64::prelude::{Engine, BASE64_STANDARD};

use crate::{Error, Result};

thread_local! {
    static DETERMINISTIC_IDS: RefCell<Option<u64>> = const { RefCell::new(None) };
}

/// Make UUID generation deterministic on this thread, seeded with `seed`.
///
/// Round-trip tests that compare serialized output byte-for-byte need stable identifiers;
/// everything else should leave this alone.
pub fn set_deterministic_ids(seed: u64) {
    DETERMINISTIC_IDS.with(|s| *s.borrow_mut() = Some(seed | 1));
}

/// Return to random UUID generation on this thread.
pub fn unset_deterministic_ids() {
    DETERMINISTIC_IDS.with(|s| *s.borrow_mut() = None);
}

/// A fresh lower-case hyphenated UUID, without any `urn:uuid:` prefix.
pub fn make_uuid() -> String {
    let deterministic = DETERMINISTIC_IDS.with(|s| {
        let mut state = s.borrow_mut();
        state.as_mut().map(|x| {
            let mut bytes = [0u8; 16];
            for chunk in bytes.chunks_mut(8) {
                // xorshift64*
                *x ^= *x >> 12;
                *x ^= *x << 25;
                *x ^= *x >> 27;
                let v = x.wrapping_mul(0x2545F4914F6CDD1D).to_be_bytes();
                chunk.copy_from_slice(&v[..chunk.len()]);
            }
            bytes
        })
    });

    match deterministic {
        Some(mut bytes) => {
            bytes[6] = (bytes[6] & 0x0f) | 0x40;
            bytes[8] = (bytes[8] & 0x3f) | 0x80;
            uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
        }
        None => uuid::Uuid::new_v4().hyphenated().to_string(),
    }
}

/// Strip a leading `urn:uuid:` prefix, if present.
pub fn remove_urn_uuid(id: &str) -> String {
    id.strip_prefix("urn:uuid:").unwrap_or(id).to_string()
}

/// The 16 raw bytes of a hyphenated UUID string.
pub fn uuid_to_bytes(id: &str) -> Result<[u8; 16]> {
    uuid::Uuid::parse_str(id)
        .map(|u| *u.as_bytes())
        .map_err(|_| Error::MiscError(format!("bad UUID {id}")))
}

/// A hyphenated UUID string from 16 raw bytes.
pub fn uuid_from_bytes(bytes: [u8; 16]) -> String {
    uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
}

/// The digest used throughout DCPs: standard-padding base64 of the SHA-1 of the file.
///
/// `progress` is called with a fraction in `[0, 1]` as the file is read.
pub fn make_digest(path: &Path, progress: Option<&mut dyn FnMut(f32)>) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::FileError(e, path.to_path_buf()))?;
    let total = file
        .metadata()
        .map_err(|e| Error::FileError(e, path.to_path_buf()))?
        .len();
    let mut sha = openssl::sha::Sha1::new();
    let mut buffer = vec![0u8; 65536];
    let mut done: u64 = 0;
    let mut progress = progress;
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        if n == 0 {
            break;
        }
        sha.update(&buffer[..n]);
        done += n as u64;
        if let Some(p) = progress.as_mut() {
            if total > 0 {
                p(done as f32 / total as f32);
            }
        }
    }
    Ok(BASE64_STANDARD.encode(sha.finish()))
}

/// Base64 SHA-1 of a byte slice.
pub fn make_digest_data(data: &[u8]) -> String {
    BASE64_STANDARD.encode(openssl::sha::sha1(data))
}

/// A filename template. `%`-specifiers are replaced from a map, so that callers can control
/// how CPL and PKL files are named (`%t` is conventionally the file type, `%i` the identifier).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameFormat {
    specification: String,
}

impl NameFormat {
    pub fn new(specification: &str) -> NameFormat {
        NameFormat { specification: specification.to_string() }
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    /// Apply `values` to the specification and append `suffix`.
    pub fn format(&self, values: &[(char, &str)], suffix: &str) -> String {
        let mut out = String::new();
        let mut chars = self.specification.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(spec) => {
                    if let Some((_, v)) = values.iter().find(|(k, _)| *k == spec) {
                        out.push_str(v);
                    } else {
                        out.push('%');
                        out.push(spec);
                    }
                }
                None => out.push('%'),
            }
        }
        out.push_str(suffix);
        out
    }
}
