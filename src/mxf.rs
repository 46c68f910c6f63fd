//! The essence container layer.
//!
//! Picture, sound, SMPTE timed text and auxiliary essence live in MXF-style KLV container
//! files: a partition pack, a run of frame triplets, header metadata, a frame index and a
//! random-index trailer. The header carries the typed description of the essence (kind, edit
//! rate, dimensions, channel layout, language), the encryption declaration with its key id,
//! and — for sound — the MCA label sub-descriptors that are later transcribed into the CPL.
//!
//! Frames are encrypted individually with AES-128-CBC under the asset's content key; the
//! header declares encryption whether or not a key is currently installed, which is what
//! `encrypted()` on the assets reports.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use openssl::symm::{decrypt, encrypt, Cipher};
use tracing::debug;

use crate::key::Key;
use crate::types::{Fraction, Size};
use crate::{Error, Result};

const PARTITION_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01, 0x01, 0x05, 0x00,
    0x00,
];
const HEADER_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0d, 0x01, 0x01, 0x01, 0x01, 0x01, 0x2f,
    0x00,
];
const FRAME_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0d, 0x01, 0x03, 0x01, 0x00, 0x00, 0x00,
    0x00,
];
const INDEX_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
    0x00,
];
const TRAILER_KEY: [u8; 16] = [
    0x06, 0x0e, 0x2b, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01, 0x01, 0x11, 0x01,
    0x00,
];

// header local-set tags
const TAG_KIND: u16 = 0x0101;
const TAG_EDIT_RATE: u16 = 0x0102;
const TAG_DURATION: u16 = 0x0103;
const TAG_WIDTH: u16 = 0x0104;
const TAG_HEIGHT: u16 = 0x0105;
const TAG_CHANNELS: u16 = 0x0106;
const TAG_SAMPLING_RATE: u16 = 0x0107;
const TAG_LANGUAGE: u16 = 0x0108;
const TAG_ENCRYPTED: u16 = 0x0109;
const TAG_KEY_ID: u16 = 0x010a;
const TAG_RESOURCE_ID: u16 = 0x010b;
const TAG_COMPANY_NAME: u16 = 0x010c;
const TAG_PRODUCT_NAME: u16 = 0x010d;
const TAG_PRODUCT_VERSION: u16 = 0x010e;
const TAG_SOUNDFIELD: u16 = 0x0110;
const TAG_CHANNEL_LABEL: u16 = 0x0111;
const TAG_FONT_ID: u16 = 0x0112;

// sub-descriptor tags
const SUB_INSTANCE_ID: u16 = 0x0001;
const SUB_DICTIONARY_ID: u16 = 0x0002;
const SUB_LINK_ID: u16 = 0x0003;
const SUB_TAG_SYMBOL: u16 = 0x0004;
const SUB_TAG_NAME: u16 = 0x0005;
const SUB_CHANNEL_ID: u16 = 0x0006;
const SUB_SPOKEN_LANGUAGE: u16 = 0x0007;
const SUB_GROUP_LINK_ID: u16 = 0x0008;

/// What kind of essence a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssenceKind {
    MonoPicture,
    StereoPicture,
    Sound,
    TimedText,
    AuxData,
}

impl EssenceKind {
    fn code(&self) -> u8 {
        match self {
            EssenceKind::MonoPicture => 1,
            EssenceKind::StereoPicture => 2,
            EssenceKind::Sound => 3,
            EssenceKind::TimedText => 4,
            EssenceKind::AuxData => 5,
        }
    }

    fn from_code(code: u8) -> Result<EssenceKind> {
        Ok(match code {
            1 => EssenceKind::MonoPicture,
            2 => EssenceKind::StereoPicture,
            3 => EssenceKind::Sound,
            4 => EssenceKind::TimedText,
            5 => EssenceKind::AuxData,
            _ => return Err(Error::ReadError(format!("unknown essence kind {code}"))),
        })
    }
}

/// Identification metadata written to every container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxfMetadata {
    pub company_name: String,
    pub product_name: String,
    pub product_version: String,
}

impl Default for MxfMetadata {
    fn default() -> MxfMetadata {
        MxfMetadata {
            company_name: "dcp-rs".to_string(),
            product_name: "dcp".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The MCA soundfield group label sub-descriptor, as stored in a sound container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundfieldGroupLabel {
    pub instance_id: String,
    pub dictionary_id: String,
    pub link_id: String,
    pub tag_symbol: String,
    pub tag_name: Option<String>,
    pub spoken_language: Option<String>,
}

/// One MCA audio channel label sub-descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChannelLabel {
    pub instance_id: String,
    pub dictionary_id: String,
    pub link_id: String,
    pub tag_symbol: String,
    pub tag_name: Option<String>,
    pub channel_id: Option<u32>,
    pub spoken_language: Option<String>,
    pub soundfield_group_link_id: Option<String>,
}

/// The typed header of an essence container.
#[derive(Debug, Clone, PartialEq)]
pub struct MxfHeader {
    pub kind: EssenceKind,
    pub edit_rate: Fraction,
    pub intrinsic_duration: i64,
    pub size: Option<Size>,
    pub channels: Option<u16>,
    pub sampling_rate: Option<u32>,
    pub language: Option<String>,
    /// Declared in the container whether or not a key is available.
    pub encrypted: bool,
    pub key_id: Option<String>,
    /// Timed text only: the id of the XML resource inside the container.
    pub resource_id: Option<String>,
    pub metadata: MxfMetadata,
    pub soundfield: Option<SoundfieldGroupLabel>,
    pub channel_labels: Vec<AudioChannelLabel>,
    /// Timed text only: ids of the font resources stored after the XML frame.
    pub font_ids: Vec<String>,
}

impl MxfHeader {
    pub fn new(kind: EssenceKind, edit_rate: Fraction) -> MxfHeader {
        MxfHeader {
            kind,
            edit_rate,
            intrinsic_duration: 0,
            size: None,
            channels: None,
            sampling_rate: None,
            language: None,
            encrypted: false,
            key_id: None,
            resource_id: None,
            metadata: MxfMetadata::default(),
            soundfield: None,
            channel_labels: Vec::new(),
            font_ids: Vec::new(),
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut set = LocalSet::new();
        set.put_u8(TAG_KIND, self.kind.code());
        set.put_fraction(TAG_EDIT_RATE, self.edit_rate);
        set.put_u64(TAG_DURATION, self.intrinsic_duration as u64);
        if let Some(size) = self.size {
            set.put_u32(TAG_WIDTH, size.width);
            set.put_u32(TAG_HEIGHT, size.height);
        }
        if let Some(c) = self.channels {
            set.put_u16(TAG_CHANNELS, c);
        }
        if let Some(r) = self.sampling_rate {
            set.put_u32(TAG_SAMPLING_RATE, r);
        }
        if let Some(l) = &self.language {
            set.put_string(TAG_LANGUAGE, l);
        }
        set.put_u8(TAG_ENCRYPTED, self.encrypted as u8);
        if let Some(k) = &self.key_id {
            set.put_string(TAG_KEY_ID, k);
        }
        if let Some(r) = &self.resource_id {
            set.put_string(TAG_RESOURCE_ID, r);
        }
        set.put_string(TAG_COMPANY_NAME, &self.metadata.company_name);
        set.put_string(TAG_PRODUCT_NAME, &self.metadata.product_name);
        set.put_string(TAG_PRODUCT_VERSION, &self.metadata.product_version);
        if let Some(sf) = &self.soundfield {
            let mut sub = LocalSet::new();
            sub.put_string(SUB_INSTANCE_ID, &sf.instance_id);
            sub.put_string(SUB_DICTIONARY_ID, &sf.dictionary_id);
            sub.put_string(SUB_LINK_ID, &sf.link_id);
            sub.put_string(SUB_TAG_SYMBOL, &sf.tag_symbol);
            if let Some(n) = &sf.tag_name {
                sub.put_string(SUB_TAG_NAME, n);
            }
            if let Some(l) = &sf.spoken_language {
                sub.put_string(SUB_SPOKEN_LANGUAGE, l);
            }
            set.put_bytes(TAG_SOUNDFIELD, &sub.bytes);
        }
        for label in &self.channel_labels {
            let mut sub = LocalSet::new();
            sub.put_string(SUB_INSTANCE_ID, &label.instance_id);
            sub.put_string(SUB_DICTIONARY_ID, &label.dictionary_id);
            sub.put_string(SUB_LINK_ID, &label.link_id);
            sub.put_string(SUB_TAG_SYMBOL, &label.tag_symbol);
            if let Some(n) = &label.tag_name {
                sub.put_string(SUB_TAG_NAME, n);
            }
            if let Some(c) = label.channel_id {
                sub.put_u32(SUB_CHANNEL_ID, c);
            }
            if let Some(l) = &label.spoken_language {
                sub.put_string(SUB_SPOKEN_LANGUAGE, l);
            }
            if let Some(g) = &label.soundfield_group_link_id {
                sub.put_string(SUB_GROUP_LINK_ID, g);
            }
            set.put_bytes(TAG_CHANNEL_LABEL, &sub.bytes);
        }
        for id in &self.font_ids {
            set.put_string(TAG_FONT_ID, id);
        }
        set.bytes
    }

    fn deserialize(bytes: &[u8]) -> Result<MxfHeader> {
        let mut kind = None;
        let mut header = MxfHeader::new(EssenceKind::MonoPicture, Fraction::new(24, 1));
        let mut width = None;
        let mut height = None;
        for (tag, value) in LocalSet::entries(bytes)? {
            match tag {
                TAG_KIND => kind = Some(EssenceKind::from_code(read_u8(value)?)?),
                TAG_EDIT_RATE => header.edit_rate = read_fraction(value)?,
                TAG_DURATION => header.intrinsic_duration = read_u64(value)? as i64,
                TAG_WIDTH => width = Some(read_u32(value)?),
                TAG_HEIGHT => height = Some(read_u32(value)?),
                TAG_CHANNELS => header.channels = Some(read_u16(value)?),
                TAG_SAMPLING_RATE => header.sampling_rate = Some(read_u32(value)?),
                TAG_LANGUAGE => header.language = Some(read_string(value)?),
                TAG_ENCRYPTED => header.encrypted = read_u8(value)? != 0,
                TAG_KEY_ID => header.key_id = Some(read_string(value)?),
                TAG_RESOURCE_ID => header.resource_id = Some(read_string(value)?),
                TAG_COMPANY_NAME => header.metadata.company_name = read_string(value)?,
                TAG_PRODUCT_NAME => header.metadata.product_name = read_string(value)?,
                TAG_PRODUCT_VERSION => header.metadata.product_version = read_string(value)?,
                TAG_SOUNDFIELD => header.soundfield = Some(read_soundfield(value)?),
                TAG_CHANNEL_LABEL => header.channel_labels.push(read_channel_label(value)?),
                TAG_FONT_ID => header.font_ids.push(read_string(value)?),
                _ => {} // unknown tags are skippable by construction
            }
        }
        header.kind = kind.ok_or_else(|| Error::ReadError("container has no essence kind".to_string()))?;
        if let (Some(w), Some(h)) = (width, height) {
            header.size = Some(Size::new(w, h));
        }
        Ok(header)
    }
}

struct LocalSet {
    bytes: Vec<u8>,
}

impl LocalSet {
    fn new() -> LocalSet {
        LocalSet { bytes: Vec::new() }
    }

    fn put_bytes(&mut self, tag: u16, value: &[u8]) {
        debug_assert!(value.len() <= u16::MAX as usize);
        self.bytes.write_u16::<BigEndian>(tag).unwrap();
        self.bytes.write_u16::<BigEndian>(value.len() as u16).unwrap();
        self.bytes.extend_from_slice(value);
    }

    fn put_string(&mut self, tag: u16, value: &str) {
        self.put_bytes(tag, value.as_bytes());
    }

    fn put_u8(&mut self, tag: u16, value: u8) {
        self.put_bytes(tag, &[value]);
    }

    fn put_u16(&mut self, tag: u16, value: u16) {
        self.put_bytes(tag, &value.to_be_bytes());
    }

    fn put_u32(&mut self, tag: u16, value: u32) {
        self.put_bytes(tag, &value.to_be_bytes());
    }

    fn put_u64(&mut self, tag: u16, value: u64) {
        self.put_bytes(tag, &value.to_be_bytes());
    }

    fn put_fraction(&mut self, tag: u16, value: Fraction) {
        let mut v = Vec::with_capacity(16);
        v.write_i64::<BigEndian>(value.numerator).unwrap();
        v.write_i64::<BigEndian>(value.denominator).unwrap();
        self.put_bytes(tag, &v);
    }

    fn entries(bytes: &[u8]) -> Result<Vec<(u16, &[u8])>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            if pos + 4 > bytes.len() {
                return Err(Error::ReadError("truncated local set".to_string()));
            }
            let tag = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
            let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            pos += 4;
            if pos + len > bytes.len() {
                return Err(Error::ReadError("truncated local set entry".to_string()));
            }
            out.push((tag, &bytes[pos..pos + len]));
            pos += len;
        }
        Ok(out)
    }
}

fn read_u8(v: &[u8]) -> Result<u8> {
    v.first().copied().ok_or_else(|| Error::ReadError("short field".to_string()))
}

fn read_u16(v: &[u8]) -> Result<u16> {
    Ok((&mut &v[..]).read_u16::<BigEndian>().map_err(|_| Error::ReadError("short field".to_string()))?)
}

fn read_u32(v: &[u8]) -> Result<u32> {
    Ok((&mut &v[..]).read_u32::<BigEndian>().map_err(|_| Error::ReadError("short field".to_string()))?)
}

fn read_u64(v: &[u8]) -> Result<u64> {
    Ok((&mut &v[..]).read_u64::<BigEndian>().map_err(|_| Error::ReadError("short field".to_string()))?)
}

fn read_fraction(v: &[u8]) -> Result<Fraction> {
    let mut r = &v[..];
    let n = r.read_i64::<BigEndian>().map_err(|_| Error::ReadError("short fraction".to_string()))?;
    let d = r.read_i64::<BigEndian>().map_err(|_| Error::ReadError("short fraction".to_string()))?;
    Ok(Fraction::new(n, d))
}

fn read_string(v: &[u8]) -> Result<String> {
    String::from_utf8(v.to_vec()).map_err(|_| Error::ReadError("bad string field".to_string()))
}

fn read_soundfield(bytes: &[u8]) -> Result<SoundfieldGroupLabel> {
    let mut sf = SoundfieldGroupLabel {
        instance_id: String::new(),
        dictionary_id: String::new(),
        link_id: String::new(),
        tag_symbol: String::new(),
        tag_name: None,
        spoken_language: None,
    };
    for (tag, value) in LocalSet::entries(bytes)? {
        match tag {
            SUB_INSTANCE_ID => sf.instance_id = read_string(value)?,
            SUB_DICTIONARY_ID => sf.dictionary_id = read_string(value)?,
            SUB_LINK_ID => sf.link_id = read_string(value)?,
            SUB_TAG_SYMBOL => sf.tag_symbol = read_string(value)?,
            SUB_TAG_NAME => sf.tag_name = Some(read_string(value)?),
            SUB_SPOKEN_LANGUAGE => sf.spoken_language = Some(read_string(value)?),
            _ => {}
        }
    }
    Ok(sf)
}

fn read_channel_label(bytes: &[u8]) -> Result<AudioChannelLabel> {
    let mut label = AudioChannelLabel {
        instance_id: String::new(),
        dictionary_id: String::new(),
        link_id: String::new(),
        tag_symbol: String::new(),
        tag_name: None,
        channel_id: None,
        spoken_language: None,
        soundfield_group_link_id: None,
    };
    for (tag, value) in LocalSet::entries(bytes)? {
        match tag {
            SUB_INSTANCE_ID => label.instance_id = read_string(value)?,
            SUB_DICTIONARY_ID => label.dictionary_id = read_string(value)?,
            SUB_LINK_ID => label.link_id = read_string(value)?,
            SUB_TAG_SYMBOL => label.tag_symbol = read_string(value)?,
            SUB_TAG_NAME => label.tag_name = Some(read_string(value)?),
            SUB_CHANNEL_ID => label.channel_id = Some(read_u32(value)?),
            SUB_SPOKEN_LANGUAGE => label.spoken_language = Some(read_string(value)?),
            SUB_GROUP_LINK_ID => label.soundfield_group_link_id = Some(read_string(value)?),
            _ => {}
        }
    }
    Ok(label)
}

fn write_klv(file: &mut File, key: &[u8; 16], value: &[u8], path: &Path) -> Result<()> {
    if value.len() >= 1 << 24 {
        return Err(Error::MXFFileError("KLV value too large".to_string(), path.to_path_buf()));
    }
    let io = |e| Error::FileError(e, path.to_path_buf());
    file.write_all(key).map_err(io)?;
    let len = value.len() as u32;
    file.write_all(&[0x83, (len >> 16) as u8, (len >> 8) as u8, len as u8])
        .map_err(io)?;
    file.write_all(value).map_err(io)?;
    Ok(())
}

fn read_klv_header(file: &mut File, path: &Path) -> Result<([u8; 16], u32)> {
    let io = |e| Error::FileError(e, path.to_path_buf());
    let mut key = [0u8; 16];
    file.read_exact(&mut key).map_err(io)?;
    let mut len = [0u8; 4];
    file.read_exact(&mut len).map_err(io)?;
    if len[0] != 0x83 {
        return Err(Error::MXFFileError("bad KLV length form".to_string(), path.to_path_buf()));
    }
    Ok((key, ((len[1] as u32) << 16) | ((len[2] as u32) << 8) | len[3] as u32))
}

/// Random access to the frames of an essence container.
pub struct MxfReader {
    file: File,
    path: PathBuf,
    header: MxfHeader,
    index: Vec<(u64, u32)>,
    key: Option<Key>,
}

impl MxfReader {
    pub fn open(path: &Path) -> Result<MxfReader> {
        let io = |e| Error::FileError(e, path.to_path_buf());
        let mut file = File::open(path).map_err(io)?;

        let (key, len) = read_klv_header(&mut file, path)?;
        if key != PARTITION_KEY {
            return Err(Error::MXFFileError("not an essence container".to_string(), path.to_path_buf()));
        }
        file.seek(SeekFrom::Current(len as i64)).map_err(io)?;

        // trailer: key + header offset + index offset
        file.seek(SeekFrom::End(-32)).map_err(io)?;
        let mut trailer = [0u8; 32];
        file.read_exact(&mut trailer).map_err(io)?;
        if trailer[..16] != TRAILER_KEY {
            return Err(Error::MXFFileError("missing container trailer".to_string(), path.to_path_buf()));
        }
        let header_offset = u64::from_be_bytes(trailer[16..24].try_into().unwrap());
        let index_offset = u64::from_be_bytes(trailer[24..32].try_into().unwrap());

        file.seek(SeekFrom::Start(header_offset)).map_err(io)?;
        let (key, len) = read_klv_header(&mut file, path)?;
        if key != HEADER_KEY {
            return Err(Error::MXFFileError("missing container header".to_string(), path.to_path_buf()));
        }
        let mut header_bytes = vec![0u8; len as usize];
        file.read_exact(&mut header_bytes).map_err(io)?;
        let header = MxfHeader::deserialize(&header_bytes)?;

        file.seek(SeekFrom::Start(index_offset)).map_err(io)?;
        let (key, _len) = read_klv_header(&mut file, path)?;
        if key != INDEX_KEY {
            return Err(Error::MXFFileError("missing frame index".to_string(), path.to_path_buf()));
        }
        let count = file.read_u32::<BigEndian>().map_err(io)?;
        let mut index = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let offset = file.read_u64::<BigEndian>().map_err(io)?;
            let size = file.read_u32::<BigEndian>().map_err(io)?;
            index.push((offset, size));
        }

        debug!("opened essence container {} with {} frames", path.display(), index.len());
        Ok(MxfReader { file, path: path.to_path_buf(), header, index, key: None })
    }

    pub fn header(&self) -> &MxfHeader {
        &self.header
    }

    pub fn frame_count(&self) -> i64 {
        self.index.len() as i64
    }

    /// Install the content key used to decrypt frames.
    pub fn set_key(&mut self, key: Key) {
        self.key = Some(key);
    }

    /// Read one frame, decrypting if the container is encrypted and a key is installed.
    /// Without a key the stored (encrypted) payload is returned as-is.
    pub fn read_frame(&mut self, frame: i64) -> Result<Vec<u8>> {
        let io = |e| Error::FileError(e, self.path.clone());
        let (offset, size) = *self
            .index
            .get(frame as usize)
            .ok_or_else(|| Error::MiscError(format!("frame {frame} out of range")))?;
        self.file.seek(SeekFrom::Start(offset)).map_err(io)?;
        let (key, len) = read_klv_header(&mut self.file, &self.path)?;
        if key != FRAME_KEY || len != size {
            return Err(Error::MXFFileError("corrupt frame index".to_string(), self.path.clone()));
        }
        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload).map_err(io)?;

        if self.header.encrypted {
            if let Some(content_key) = &self.key {
                if payload.len() < 16 {
                    return Err(Error::MXFFileError("encrypted frame too short".to_string(), self.path.clone()));
                }
                let (iv, ciphertext) = payload.split_at(16);
                return decrypt(Cipher::aes_128_cbc(), content_key.as_bytes(), Some(iv), ciphertext)
                    .map_err(|e| Error::MXFFileError(format!("decrypt failed: {e}"), self.path.clone()));
            }
        }
        Ok(payload)
    }
}

/// An appending writer for an essence container. Frames go in one at a time;
/// `finalize` writes the header, index and trailer.
pub struct MxfWriter {
    file: File,
    path: PathBuf,
    header: MxfHeader,
    index: Vec<(u64, u32)>,
    key: Option<Key>,
    position: u64,
    finalized: bool,
}

impl MxfWriter {
    pub fn create(path: &Path, header: MxfHeader, key: Option<Key>, overwrite: bool) -> Result<MxfWriter> {
        if path.exists() && !overwrite {
            return Err(Error::FileError(
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file exists"),
                path.to_path_buf(),
            ));
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::FileError(e, path.to_path_buf()))?;
        let mut version = Vec::new();
        version.write_u32::<BigEndian>(1).unwrap();
        write_klv(&mut file, &PARTITION_KEY, &version, path)?;
        let position = 20 + version.len() as u64;
        Ok(MxfWriter {
            file,
            path: path.to_path_buf(),
            header,
            index: Vec::new(),
            key,
            position,
            finalized: false,
        })
    }

    pub fn header_mut(&mut self) -> &mut MxfHeader {
        &mut self.header
    }

    pub fn frames_written(&self) -> i64 {
        self.index.len() as i64
    }

    /// Append one frame, encrypting when the header declares encryption and a key was given.
    pub fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        let payload = if self.header.encrypted {
            let content_key = self.key.as_ref().ok_or_else(|| {
                Error::MiscError("writer has no key for an encrypted container".to_string())
            })?;
            let mut iv = [0u8; 16];
            openssl::rand::rand_bytes(&mut iv)?;
            let mut out = iv.to_vec();
            out.extend(
                encrypt(Cipher::aes_128_cbc(), content_key.as_bytes(), Some(&iv[..]), data)
                    .map_err(|e| Error::MXFFileError(format!("encrypt failed: {e}"), self.path.clone()))?,
            );
            out
        } else {
            data.to_vec()
        };
        self.index.push((self.position, payload.len() as u32));
        write_klv(&mut self.file, &FRAME_KEY, &payload, &self.path)?;
        self.position += 20 + payload.len() as u64;
        Ok(())
    }

    /// Write header metadata, frame index and trailer. Returns the number of frames written.
    /// The header's intrinsic duration is set to the frame count; essence with more than one
    /// container frame per edit unit should use [`finalize_with_duration`](Self::finalize_with_duration).
    pub fn finalize(self) -> Result<i64> {
        let duration = self.index.len() as i64;
        self.finalize_with_duration(duration)?;
        Ok(duration)
    }

    /// As [`finalize`](Self::finalize), but records `duration` edit units in the header.
    pub fn finalize_with_duration(mut self, duration: i64) -> Result<()> {
        let header_offset = self.position;
        self.header.intrinsic_duration = duration;
        let header_bytes = self.header.serialize();
        write_klv(&mut self.file, &HEADER_KEY, &header_bytes, &self.path)?;
        self.position += 20 + header_bytes.len() as u64;

        let index_offset = self.position;
        let mut index_bytes = Vec::with_capacity(4 + self.index.len() * 12);
        index_bytes.write_u32::<BigEndian>(self.index.len() as u32).unwrap();
        for (offset, size) in &self.index {
            index_bytes.write_u64::<BigEndian>(*offset).unwrap();
            index_bytes.write_u32::<BigEndian>(*size).unwrap();
        }
        write_klv(&mut self.file, &INDEX_KEY, &index_bytes, &self.path)?;

        let io = |e| Error::FileError(e, self.path.clone());
        self.file.write_all(&TRAILER_KEY).map_err(io)?;
        self.file.write_all(&header_offset.to_be_bytes()).map_err(io)?;
        self.file.write_all(&index_offset.to_be_bytes()).map_err(io)?;
        self.file.flush().map_err(io)?;
        self.finalized = true;
        debug!("finalized {} with {} frames", self.path.display(), self.index.len());
        Ok(())
    }
}

impl Drop for MxfWriter {
    fn drop(&mut self) {
        if !self.finalized {
            tracing::warn!(
                "essence container {} dropped without finalize; file will be unreadable",
                self.path.display()
            );
        }
    }
}

/// Read just the header of a container, for asset probing.
pub fn probe(path: &Path) -> Result<MxfHeader> {
    Ok(MxfReader::open(path)?.header().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dcp-mxf-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn frame_round_trip() {
        let path = tmp("plain.mxf");
        let header = MxfHeader::new(EssenceKind::MonoPicture, Fraction::new(24, 1));
        let mut writer = MxfWriter::create(&path, header, None, true).unwrap();
        writer.write_frame(b"frame zero").unwrap();
        writer.write_frame(b"frame one").unwrap();
        assert_eq!(writer.finalize().unwrap(), 2);

        let mut reader = MxfReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.header().intrinsic_duration, 2);
        assert_eq!(reader.read_frame(0).unwrap(), b"frame zero");
        assert_eq!(reader.read_frame(1).unwrap(), b"frame one");
        assert!(reader.read_frame(2).is_err());
    }

    #[test]
    fn encrypted_frames_need_the_key() {
        let path = tmp("encrypted.mxf");
        let key = Key::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let mut header = MxfHeader::new(EssenceKind::Sound, Fraction::new(24, 1));
        header.encrypted = true;
        header.key_id = Some("76205d66-fb44-4dbe-b252-92dc4511c184".to_string());
        let mut writer = MxfWriter::create(&path, header, Some(key), true).unwrap();
        writer.write_frame(b"very secret samples").unwrap();
        writer.finalize().unwrap();

        let mut reader = MxfReader::open(&path).unwrap();
        assert!(reader.header().encrypted);
        // without the key we get ciphertext back
        assert_ne!(reader.read_frame(0).unwrap(), b"very secret samples");
        reader.set_key(key);
        assert_eq!(reader.read_frame(0).unwrap(), b"very secret samples");
    }

    #[test]
    fn header_fields_survive() {
        let path = tmp("header.mxf");
        let mut header = MxfHeader::new(EssenceKind::Sound, Fraction::new(48, 1));
        header.channels = Some(6);
        header.sampling_rate = Some(48000);
        header.language = Some("en-GB".to_string());
        header.soundfield = Some(SoundfieldGroupLabel {
            instance_id: "0ff3e6ad-2fbe-4207-9dc5-8904d0ec0d6d".to_string(),
            dictionary_id: "060e2b34.0401010d.03020201.00000000".to_string(),
            link_id: "77867a61-b55d-4ef6-b2e7-2d0e1d0d64ab".to_string(),
            tag_symbol: "sg51".to_string(),
            tag_name: Some("5.1".to_string()),
            spoken_language: Some("en-GB".to_string()),
        });
        header.channel_labels.push(AudioChannelLabel {
            instance_id: "527d0cb9-2b5a-4b49-b336-e9eb0c4cfa7e".to_string(),
            dictionary_id: "060e2b34.0401010d.03020101.00000000".to_string(),
            link_id: "9e2a248e-66a0-4384-8345-9b1553649a06".to_string(),
            tag_symbol: "chL".to_string(),
            tag_name: Some("Left".to_string()),
            channel_id: Some(1),
            spoken_language: Some("en-GB".to_string()),
            soundfield_group_link_id: Some("77867a61-b55d-4ef6-b2e7-2d0e1d0d64ab".to_string()),
        });
        let original = header.clone();
        let mut writer = MxfWriter::create(&path, header, None, true).unwrap();
        writer.write_frame(&[0u8; 6000]).unwrap();
        writer.finalize().unwrap();

        let read = probe(&path).unwrap();
        assert_eq!(read.channels, original.channels);
        assert_eq!(read.sampling_rate, original.sampling_rate);
        assert_eq!(read.language, original.language);
        assert_eq!(read.soundfield, original.soundfield);
        assert_eq!(read.channel_labels, original.channel_labels);
        assert_eq!(read.intrinsic_duration, 1);
    }
}
