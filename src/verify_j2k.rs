//! JPEG 2000 codestream conformance checks against the DCI profile.

use crate::verify::{NoteCode, NoteType, VerificationNote};

struct InvalidCodestream(String);

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn get_8(&mut self) -> Result<u8, InvalidCodestream> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| InvalidCodestream("unexpected end of file".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn get_16(&mut self) -> Result<u16, InvalidCodestream> {
        let a = self.get_8()? as u16;
        let b = self.get_8()? as u16;
        Ok(b | (a << 8))
    }

    fn get_32(&mut self) -> Result<u32, InvalidCodestream> {
        let a = self.get_16()? as u32;
        let b = self.get_16()? as u32;
        Ok(b | (a << 16))
    }

    fn require_8(&mut self, value: u8, note: &str) -> Result<(), InvalidCodestream> {
        let v = self.get_8()?;
        if v != value {
            return Err(InvalidCodestream(note.replace("%1", &v.to_string())));
        }
        Ok(())
    }

    fn require_16(&mut self, value: u16, note: &str) -> Result<(), InvalidCodestream> {
        let v = self.get_16()?;
        if v != value {
            return Err(InvalidCodestream(note.replace("%1", &v.to_string())));
        }
        Ok(())
    }

    fn require_32(&mut self, value: u32, note: &str) -> Result<(), InvalidCodestream> {
        let v = self.get_32()?;
        if v != value {
            return Err(InvalidCodestream(note.replace("%1", &v.to_string())));
        }
        Ok(())
    }

    fn require_marker(&mut self, id: u8, name: &str) -> Result<(), InvalidCodestream> {
        if self.get_8()? != 0xff {
            return Err(InvalidCodestream("missing marker start byte".to_string()));
        }
        if self.get_8()? != id {
            return Err(InvalidCodestream(format!("missing_marker {name}")));
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<(), InvalidCodestream> {
        if self.pos + n > self.data.len() {
            return Err(InvalidCodestream("unexpected end of file".to_string()));
        }
        self.pos += n;
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}

fn marker_name(id: u8) -> Option<&'static str> {
    Some(match id {
        0x4f => "SOC",
        0x51 => "SIZ",
        0x52 => "COD",
        0x53 => "COC",
        0x55 => "TLM",
        0x5c => "QCD",
        0x5d => "QCC",
        0x5f => "POC",
        0x64 => "COM",
        0x90 => "SOT",
        0x93 => "SOD",
        0xd9 => "EOC",
        _ => return None,
    })
}

/// Walk the markers of one codestream, appending a note for each DCI profile violation.
/// Structural breakage stops the walk with a single `INVALID_JPEG2000_CODESTREAM` note; a
/// parseable codestream may accumulate several notes.
pub fn verify_j2k(data: &[u8], notes: &mut Vec<VerificationNote>) {
    if let Err(InvalidCodestream(what)) = walk(data, notes) {
        notes.push(
            VerificationNote::new(NoteType::Error, NoteCode::InvalidJpeg2000Codestream)
                .with_note(&what),
        );
    }
}

fn walk(data: &[u8], notes: &mut Vec<VerificationNote>) -> Result<(), InvalidCodestream> {
    let mut p = Parser { data, pos: 0 };

    p.require_marker(0x4f, "SOC")?;
    p.require_marker(0x51, "SIZ")?;
    let l_siz = p.get_16()?;
    if l_siz != 47 {
        return Err(InvalidCodestream(format!("unexpected SIZ size {l_siz}")));
    }
    p.get_16()?; // codestream capabilities
    let image_width = p.get_32()?;
    let _image_height = p.get_32()?;
    let fourk = image_width > 2048;
    p.require_32(0, "invalid top-left image x coordinate %1")?;
    p.require_32(0, "invalid top-left image y coordinate %1")?;
    let tile_width = p.get_32()?;
    let tile_height = p.get_32()?;
    if tile_width != image_width || tile_height != _image_height {
        notes.push(VerificationNote::new(
            NoteType::Bv21Error,
            NoteCode::InvalidJpeg2000TileSize,
        ));
    }
    p.require_32(0, "invalid tile anchor x coordinate %1")?;
    p.require_32(0, "invalid tile anchor y coordinate %1")?;
    p.require_16(3, "invalid component count %1")?;
    for _ in 0..3 {
        p.require_8(12 - 1, "invalid bit depth %1")?;
        p.require_8(1, "invalid horizontal subsampling factor %1")?;
        p.require_8(1, "invalid vertical subsampling factor %1")?;
    }

    let mut num_cod = 0;
    let mut num_qcd = 0;
    let mut num_poc_in_main = 0;
    let mut num_poc_after_main = 0;
    let mut main_header_finished = false;
    let mut tlm = false;

    while !p.at_end() {
        p.require_8(0xff, "missing marker start byte")?;
        let marker_id = p.get_8()?;
        let name = marker_name(marker_id)
            .ok_or_else(|| InvalidCodestream(format!("unknown marker {marker_id:2x}")))?;
        match name {
            "SOT" => {
                p.require_16(10, "invalid SOT size %1")?;
                p.get_16()?; // tile index
                p.get_32()?; // tile part length
                p.get_8()?; // tile part index
                let tile_parts = p.get_8()?;
                if !fourk && tile_parts != 3 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000TilePartsFor2k,
                        )
                        .with_note(&tile_parts.to_string()),
                    );
                }
                if fourk && tile_parts != 6 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000TilePartsFor4k,
                        )
                        .with_note(&tile_parts.to_string()),
                    );
                }
                main_header_finished = true;
            }
            "SOD" => {
                // skip entropy-coded data until the next marker in the 0xff90+ range
                while p.pos + 1 < p.data.len()
                    && (p.data[p.pos] != 0xff || p.data[p.pos + 1] < 0x90)
                {
                    p.pos += 1;
                }
                if p.pos + 1 >= p.data.len() {
                    p.pos = p.data.len();
                }
            }
            "SIZ" => return Err(InvalidCodestream("duplicate SIZ marker".to_string())),
            "COD" => {
                num_cod += 1;
                p.get_16()?; // length
                p.require_8(1, "invalid coding style %1")?;
                p.require_8(4, "invalid progression order %1")?; // CPRL
                p.require_16(1, "invalid quality layers count %1")?;
                p.require_8(1, "invalid multi-component transform flag %1")?;
                p.require_8(if fourk { 6 } else { 5 }, "invalid number of transform levels %1")?;
                let log_code_block_width = p.get_8()?;
                if log_code_block_width != 3 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000CodeBlockWidth,
                        )
                        .with_note(&(4u32 << log_code_block_width).to_string()),
                    );
                }
                let log_code_block_height = p.get_8()?;
                if log_code_block_height != 3 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000CodeBlockHeight,
                        )
                        .with_note(&(4u32 << log_code_block_height).to_string()),
                    );
                }
                p.require_8(0, "invalid mode variations")?;
                p.require_8(0, "invalid wavelet transform type %1")?; // 9/7 irreversible
                p.require_8(0x77, "invalid precinct size %1")?;
                for _ in 0..(if fourk { 6 } else { 5 }) {
                    p.require_8(0x88, "invalid precinct size %1")?;
                }
            }
            "QCD" => {
                num_qcd += 1;
                let l_qcd = p.get_16()?;
                let quantization_style = p.get_8()?;
                let guard_bits = (quantization_style >> 5) & 7;
                if fourk && guard_bits != 2 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000GuardBitsFor4k,
                        )
                        .with_note(&guard_bits.to_string()),
                    );
                }
                if !fourk && guard_bits != 1 {
                    notes.push(
                        VerificationNote::new(
                            NoteType::Bv21Error,
                            NoteCode::InvalidJpeg2000GuardBitsFor2k,
                        )
                        .with_note(&guard_bits.to_string()),
                    );
                }
                p.skip(l_qcd as usize - 3)?;
            }
            "COC" => {
                p.get_16()?; // length
                p.require_8(0, "invalid COC component number")?;
                p.require_8(1, "invalid coding style %1")?;
                p.require_8(5, "invalid number of transform levels %1")?;
                p.require_8(3, "invalid code block width exponent %1")?;
                p.require_8(3, "invalid code block height exponent %1")?;
                p.require_8(0, "invalid mode variations")?;
                p.require_8(0x77, "invalid precinct size %1")?;
                for _ in 0..5 {
                    p.require_8(0x88, "invalid precinct size %1")?;
                }
            }
            "TLM" => {
                let len = p.get_16()?;
                p.skip(len as usize - 2)?;
                tlm = true;
            }
            "QCC" | "COM" => {
                let len = p.get_16()?;
                p.skip(len as usize - 2)?;
            }
            "POC" => {
                if main_header_finished {
                    num_poc_after_main += 1;
                } else {
                    num_poc_in_main += 1;
                }
                let mut poc_note = |p: &mut Parser, wide: bool, value: u16, note: &str| {
                    let v = if wide {
                        p.get_16().map(|v| v as u32)
                    } else {
                        p.get_8().map(|v| v as u32)
                    };
                    match v {
                        Ok(v) if v == value as u32 => Ok(()),
                        Ok(_) => {
                            notes.push(
                                VerificationNote::new(
                                    NoteType::Bv21Error,
                                    NoteCode::IncorrectJpeg2000PocMarker,
                                )
                                .with_note(&note.replace("%1", &value.to_string())),
                            );
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                };
                poc_note(&mut p, true, 16, "invalid length %1")?;
                poc_note(&mut p, false, 0, "invalid RSpoc %1")?;
                poc_note(&mut p, false, 0, "invalid CSpoc %1")?;
                poc_note(&mut p, true, 1, "invalid LYEpoc %1")?;
                poc_note(&mut p, false, 6, "invalid REpoc %1")?;
                poc_note(&mut p, false, 3, "invalid CEpoc %1")?;
                poc_note(&mut p, false, 4, "invalid Ppoc %1")?;
                poc_note(&mut p, false, 6, "invalid RSpoc %1")?;
                poc_note(&mut p, false, 0, "invalid CSpoc %1")?;
                poc_note(&mut p, true, 1, "invalid LYEpoc %1")?;
                poc_note(&mut p, false, 7, "invalid REpoc %1")?;
                poc_note(&mut p, false, 3, "invalid CEpoc %1")?;
                poc_note(&mut p, false, 4, "invalid Ppoc %1")?;
            }
            "EOC" => {}
            _ => {}
        }
    }

    if num_cod == 0 {
        return Err(InvalidCodestream("no COD marker found".to_string()));
    }
    if num_cod > 1 {
        return Err(InvalidCodestream("more than one COD marker found".to_string()));
    }
    if num_qcd == 0 {
        return Err(InvalidCodestream("no QCD marker found".to_string()));
    }
    if num_qcd > 1 {
        return Err(InvalidCodestream("more than one QCD marker found".to_string()));
    }
    if num_poc_in_main != 0 && !fourk {
        notes.push(
            VerificationNote::new(
                NoteType::Bv21Error,
                NoteCode::IncorrectJpeg2000PocMarkerCountFor2k,
            )
            .with_note(&num_poc_in_main.to_string()),
        );
    }
    if num_poc_in_main != 1 && fourk {
        notes.push(
            VerificationNote::new(
                NoteType::Bv21Error,
                NoteCode::IncorrectJpeg2000PocMarkerCountFor4k,
            )
            .with_note(&num_poc_in_main.to_string()),
        );
    }
    if num_poc_after_main != 0 {
        notes.push(VerificationNote::new(
            NoteType::Bv21Error,
            NoteCode::InvalidJpeg2000PocMarkerLocation,
        ));
    }
    if !tlm {
        notes.push(VerificationNote::new(
            NoteType::Bv21Error,
            NoteCode::MissingJpeg2000TlmMarker,
        ));
    }
    Ok(())
}
