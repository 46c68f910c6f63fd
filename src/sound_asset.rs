//! PCM sound assets.
//!
//! Samples are stored as interleaved big-endian signed 24-bit PCM, one container frame per
//! edit unit. The writer accepts float buffers in `[-1, 1]` or raw 24-bit integers, emits MCA
//! label sub-descriptors for the active channels, pads missing channels with silence, and can
//! replace channel 14 with an FSK sync track for auxiliary (Atmos) synchronisation.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::key::Key;
use crate::mxf::{
    AudioChannelLabel, EssenceKind, MxfHeader, MxfReader, MxfWriter, SoundfieldGroupLabel,
};
use crate::types::{Channel, EqualityOptions, Fraction, Standard};
use crate::util::{make_uuid, uuid_to_bytes};
use crate::{Error, EqualityNoteType, NoteHandler, Result};

/// The SMPTE label dictionary UL for an audio channel, in the dotted form that goes into
/// `urn:smpte:ul:` values.
fn channel_dictionary_id(channel: Channel) -> &'static str {
    match channel {
        Channel::Left => "060e2b34.0401010d.03020101.00000000",
        Channel::Right => "060e2b34.0401010d.03020102.00000000",
        Channel::Centre => "060e2b34.0401010d.03020103.00000000",
        Channel::Lfe => "060e2b34.0401010d.03020104.00000000",
        Channel::Ls => "060e2b34.0401010d.03020105.00000000",
        Channel::Rs => "060e2b34.0401010d.03020106.00000000",
        Channel::Lss => "060e2b34.0401010d.03020107.00000000",
        Channel::Rss => "060e2b34.0401010d.03020108.00000000",
        Channel::Lrs => "060e2b34.0401010d.03020109.00000000",
        Channel::Rrs => "060e2b34.0401010d.0302010a.00000000",
        Channel::Hi => "060e2b34.0401010d.0302010b.00000000",
        Channel::Vi => "060e2b34.0401010d.0302010c.00000000",
        Channel::MotionData => "060e2b34.0401010d.0302010d.00000000",
        Channel::SyncSignal => "060e2b34.0401010d.0302010e.00000000",
        Channel::SignLanguage => "060e2b34.0401010d.0302010f.00000000",
    }
}

const SOUNDFIELD_51_DICTIONARY_ID: &str = "060e2b34.0401010d.03020201.00000000";

/// A PCM sound asset.
#[derive(Debug)]
pub struct SoundAsset {
    id: String,
    file: Option<PathBuf>,
    hash: Option<String>,
    edit_rate: Fraction,
    channels: u16,
    sampling_rate: u32,
    language: Option<String>,
    intrinsic_duration: i64,
    encrypted: bool,
    key_id: Option<String>,
    key: Option<Key>,
    standard: Standard,
}

impl SoundAsset {
    pub fn new(
        edit_rate: Fraction,
        sampling_rate: u32,
        channels: u16,
        language: Option<&str>,
        standard: Standard,
    ) -> SoundAsset {
        SoundAsset {
            id: make_uuid(),
            file: None,
            hash: None,
            edit_rate,
            channels,
            sampling_rate,
            language: language.map(|l| l.to_string()),
            intrinsic_duration: 0,
            encrypted: false,
            key_id: None,
            key: None,
            standard,
        }
    }

    pub fn from_file(path: &Path, id: &str) -> Result<SoundAsset> {
        let header = crate::mxf::probe(path)?;
        if header.kind != EssenceKind::Sound {
            return Err(Error::MXFFileError(
                "container does not hold sound".to_string(),
                path.to_path_buf(),
            ));
        }
        Ok(SoundAsset {
            id: id.to_string(),
            file: Some(path.to_path_buf()),
            hash: None,
            edit_rate: header.edit_rate,
            channels: header.channels.unwrap_or(0),
            sampling_rate: header.sampling_rate.unwrap_or(0),
            language: header.language,
            intrinsic_duration: header.intrinsic_duration,
            encrypted: header.encrypted,
            key_id: header.key_id,
            key: None,
            standard: Standard::Smpte,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: Key) {
        if self.file.is_none() {
            self.encrypted = true;
            if self.key_id.is_none() {
                self.key_id = Some(make_uuid());
            }
        }
        self.key = Some(key);
    }

    pub fn standard(&self) -> Standard {
        self.standard
    }

    pub fn pkl_type(&self, standard: Standard) -> String {
        match standard {
            Standard::Interop => "application/mxf;asdcpKind=Sound".to_string(),
            Standard::Smpte => "application/mxf".to_string(),
        }
    }

    pub fn hash_cache(&self) -> Option<&String> {
        self.hash.as_ref()
    }

    pub fn set_hash_cache(&mut self, hash: String) {
        self.hash = Some(hash);
    }

    /// Samples per edit unit (e.g. 2000 at 48 kHz / 24 fps).
    pub fn samples_per_frame(&self) -> usize {
        (self.sampling_rate as i64 * self.edit_rate.denominator / self.edit_rate.numerator) as usize
    }

    /// Begin writing. `extra_active_channels` names channels beyond the always-present 5.1
    /// main six that should carry MCA labels (e.g. `HI`, `VI`); `sync` replaces channel 14
    /// with the FSK sync track derived from the asset id.
    pub fn start_write(
        &mut self,
        path: &Path,
        extra_active_channels: Vec<Channel>,
        sync: bool,
        overwrite: bool,
    ) -> Result<SoundAssetWriter<'_>> {
        if sync && self.channels < 14 {
            return Err(Error::MiscError(
                "sync track requires at least 14 channels".to_string(),
            ));
        }
        let mut header = MxfHeader::new(EssenceKind::Sound, self.edit_rate);
        header.channels = Some(self.channels);
        header.sampling_rate = Some(self.sampling_rate);
        header.language = self.language.clone();
        header.encrypted = self.key.is_some();
        if header.encrypted && self.key_id.is_none() {
            self.key_id = Some(make_uuid());
        }
        header.key_id = self.key_id.clone();
        self.encrypted = header.encrypted;

        let group_link_id = make_uuid();
        header.soundfield = Some(SoundfieldGroupLabel {
            instance_id: make_uuid(),
            dictionary_id: SOUNDFIELD_51_DICTIONARY_ID.to_string(),
            link_id: group_link_id.clone(),
            tag_symbol: "sg51".to_string(),
            tag_name: Some("5.1".to_string()),
            spoken_language: self.language.clone(),
        });
        let mut active = vec![
            Channel::Left,
            Channel::Right,
            Channel::Centre,
            Channel::Lfe,
            Channel::Ls,
            Channel::Rs,
        ];
        for c in extra_active_channels {
            if !active.contains(&c) {
                active.push(c);
            }
        }
        if sync && !active.contains(&Channel::SyncSignal) {
            active.push(Channel::SyncSignal);
        }
        for channel in &active {
            header.channel_labels.push(AudioChannelLabel {
                instance_id: make_uuid(),
                dictionary_id: channel_dictionary_id(*channel).to_string(),
                link_id: make_uuid(),
                tag_symbol: format!("ch{}", channel.as_token()),
                tag_name: Some(channel.as_token().to_string()),
                channel_id: Some(channel.mca_channel_id()),
                spoken_language: self.language.clone(),
                soundfield_group_link_id: Some(group_link_id.clone()),
            });
        }

        let writer = MxfWriter::create(path, header, self.key, overwrite)?;
        self.file = Some(path.to_path_buf());
        self.hash = None;
        debug!("writing sound asset {} to {}", self.id, path.display());

        let samples_per_frame = self.samples_per_frame();
        let channels = self.channels as usize;
        let fsk = if sync { Some(Fsk::new(sync_bits(&self.id)?)) } else { None };
        Ok(SoundAssetWriter {
            asset: self,
            writer,
            frame: vec![0u8; channels * samples_per_frame * 3],
            offset: 0,
            samples_per_frame,
            channels,
            fsk,
        })
    }

    pub fn start_read(&self) -> Result<SoundAssetReader> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::MiscError("sound asset has no file".to_string()))?;
        let mut reader = MxfReader::open(file)?;
        if let Some(key) = self.key {
            reader.set_key(key);
        }
        Ok(SoundAssetReader { reader, channels: self.channels as usize })
    }

    pub fn equals(&self, other: &SoundAsset, opt: &EqualityOptions, note: NoteHandler) -> bool {
        if self.edit_rate != other.edit_rate {
            note(EqualityNoteType::Error, "sound edit rates differ".to_string());
            return false;
        }
        if self.channels != other.channels {
            note(EqualityNoteType::Error, "sound channel counts differ".to_string());
            return false;
        }
        if self.sampling_rate != other.sampling_rate {
            note(EqualityNoteType::Error, "sound sampling rates differ".to_string());
            return false;
        }
        if self.intrinsic_duration != other.intrinsic_duration {
            note(EqualityNoteType::Error, "sound durations differ".to_string());
            return false;
        }
        let (mut a, mut b) = match (self.start_read(), other.start_read()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return true,
        };
        for i in 0..self.intrinsic_duration {
            let (fa, fb) = match (a.get_frame(i), b.get_frame(i)) {
                (Ok(fa), Ok(fb)) => (fa, fb),
                _ => {
                    note(EqualityNoteType::Error, format!("sound frame {i} unreadable"));
                    return false;
                }
            };
            if fa.len() != fb.len() {
                note(EqualityNoteType::Error, format!("sound frame {i} sizes differ"));
                return false;
            }
            for (sa, sb) in samples(&fa).zip(samples(&fb)) {
                if (sa - sb).abs() > opt.max_audio_sample_error {
                    note(EqualityNoteType::Error, format!("sound samples in frame {i} differ"));
                    return false;
                }
            }
        }
        true
    }
}

fn samples(frame: &[u8]) -> impl Iterator<Item = i32> + '_ {
    frame.chunks_exact(3).map(|c| {
        let raw = ((c[0] as i32) << 16) | ((c[1] as i32) << 8) | c[2] as i32;
        // sign-extend 24 bits
        (raw << 8) >> 8
    })
}

/// Reads whole frames of interleaved samples.
pub struct SoundAssetReader {
    reader: MxfReader,
    channels: usize,
}

impl SoundAssetReader {
    /// One frame of interleaved big-endian 24-bit samples.
    pub fn get_frame(&mut self, frame: i64) -> Result<Vec<u8>> {
        self.reader.read_frame(frame)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Writes sample buffers; created by [`SoundAsset::start_write`].
pub struct SoundAssetWriter<'a> {
    asset: &'a mut SoundAsset,
    writer: MxfWriter,
    frame: Vec<u8>,
    offset: usize,
    samples_per_frame: usize,
    channels: usize,
    fsk: Option<Fsk>,
}

impl SoundAssetWriter<'_> {
    /// Write float samples in `[-1, 1]`, one slice per channel. Fewer slices than the asset
    /// has channels means the remaining channels are silent.
    pub fn write(&mut self, data: &[&[f32]], frames: usize) -> Result<()> {
        for i in 0..frames {
            for (c, channel_data) in data.iter().enumerate().take(self.channels) {
                let f = channel_data.get(i).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
                self.put_sample(c, (f * 8388607.0) as i32);
            }
            self.advance()?;
        }
        Ok(())
    }

    /// Write raw 24-bit signed integer samples, one slice per channel.
    pub fn write_int24(&mut self, data: &[&[i32]], frames: usize) -> Result<()> {
        for i in 0..frames {
            for (c, channel_data) in data.iter().enumerate().take(self.channels) {
                self.put_sample(c, channel_data.get(i).copied().unwrap_or(0));
            }
            self.advance()?;
        }
        Ok(())
    }

    fn put_sample(&mut self, channel: usize, value: i32) {
        let base = (self.offset * self.channels + channel) * 3;
        self.frame[base] = ((value >> 16) & 0xff) as u8;
        self.frame[base + 1] = ((value >> 8) & 0xff) as u8;
        self.frame[base + 2] = (value & 0xff) as u8;
    }

    fn advance(&mut self) -> Result<()> {
        if let Some(fsk) = &mut self.fsk {
            let sample = fsk.sample();
            let base = (self.offset * self.channels + 13) * 3;
            self.frame[base] = ((sample >> 16) & 0xff) as u8;
            self.frame[base + 1] = ((sample >> 8) & 0xff) as u8;
            self.frame[base + 2] = (sample & 0xff) as u8;
        }
        self.offset += 1;
        if self.offset == self.samples_per_frame {
            self.writer.write_frame(&self.frame)?;
            self.frame.fill(0);
            self.offset = 0;
        }
        Ok(())
    }

    /// Flush any partial frame (zero-padded) and close the container.
    pub fn finalize(mut self) -> Result<()> {
        if self.offset > 0 {
            self.writer.write_frame(&self.frame)?;
        }
        self.asset.intrinsic_duration = self.writer.finalize()?;
        Ok(())
    }
}

// FSK sync track amplitudes for the three symbols.
const FSK_A: i32 = 0x08000;
const FSK_B: i32 = 0x10000;
const FSK_C: i32 = 0x18000;

/// The 128 data bits of the sync track: the asset id, most significant bit first.
fn sync_bits(id: &str) -> Result<Vec<bool>> {
    let bytes = uuid_to_bytes(id)?;
    let mut bits = Vec::with_capacity(128);
    for byte in bytes {
        for bit in (0..8).rev() {
            bits.push((byte >> bit) & 1 == 1);
        }
    }
    Ok(bits)
}

/// Generator for the FSK sync signal.
///
/// Each data bit becomes four samples from the alphabet {A, B, C, -A, -B, -C}: a zero bit is
/// `A B B A`, a one bit is `C C -C -C`, with the whole packet's polarity alternating to keep
/// the track DC-free. The 128 id bits are split into four 32-bit packets; one packet starts
/// each edit unit, cycling 0-3.
struct Fsk {
    bits: Vec<bool>,
    bit: usize,
    phase: usize,
    polarity: i32,
}

impl Fsk {
    fn new(bits: Vec<bool>) -> Fsk {
        Fsk { bits, bit: 0, phase: 0, polarity: 1 }
    }

    fn sample(&mut self) -> i32 {
        let value = if self.bit < self.bits.len() {
            let one = self.bits[self.bit];
            let magnitude = match (one, self.phase) {
                (false, 0) | (false, 3) => FSK_A,
                (false, _) => FSK_B,
                (true, _) => FSK_C,
            };
            let sign = if one && self.phase >= 2 { -1 } else { 1 };
            magnitude * sign * self.polarity
        } else {
            0
        };
        self.phase += 1;
        if self.phase == 4 {
            self.phase = 0;
            self.bit += 1;
            if self.bit % 32 == 0 {
                self.polarity = -self.polarity;
            }
            if self.bit >= self.bits.len() {
                self.bit = 0;
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsk_bit_patterns() {
        // id bits starting 0b10000000... : first bit one, second zero
        let mut fsk = Fsk::new(vec![true, false]);
        assert_eq!(
            [fsk.sample(), fsk.sample(), fsk.sample(), fsk.sample()],
            [FSK_C, FSK_C, -FSK_C, -FSK_C]
        );
        assert_eq!(
            [fsk.sample(), fsk.sample(), fsk.sample(), fsk.sample()],
            [FSK_A, FSK_B, FSK_B, FSK_A]
        );
    }

    #[test]
    fn sync_bits_follow_the_id() {
        let bits = sync_bits("80000000-0000-0000-0000-000000000001").unwrap();
        assert_eq!(bits.len(), 128);
        assert!(bits[0]);
        assert!(!bits[1]);
        assert!(bits[127]);
    }

    #[test]
    fn sample_iterator_sign_extends() {
        let frame = [0xff, 0xff, 0xff, 0x00, 0x00, 0x01];
        let s: Vec<i32> = samples(&frame).collect();
        assert_eq!(s, vec![-1, 1]);
    }
}
