//! Render a verification run as a plain-text or JSON report.

use std::io::Write;

use serde::Serialize;

use crate::verify::{note_to_string, NoteType, VerificationNote};
use crate::{Error, Result};

#[derive(Serialize)]
struct Report<'a> {
    errors: usize,
    bv21_errors: usize,
    warnings: usize,
    notes: &'a [VerificationNote],
}

fn counts(notes: &[VerificationNote]) -> (usize, usize, usize) {
    let errors = notes.iter().filter(|n| n.note_type() == NoteType::Error).count();
    let bv21 = notes.iter().filter(|n| n.note_type() == NoteType::Bv21Error).count();
    let warnings = notes.iter().filter(|n| n.note_type() == NoteType::Warning).count();
    (errors, bv21, warnings)
}

/// Write a human-readable summary, one note per line.
pub fn write_text_report(notes: &[VerificationNote], out: &mut dyn Write) -> Result<()> {
    let write = |out: &mut dyn Write, s: String| {
        out.write_all(s.as_bytes())
            .map_err(|e| Error::MiscError(format!("could not write report: {e}")))
    };
    let (errors, bv21, warnings) = counts(notes);
    write(out, format!("Errors: {errors}\nBv2.1 errors: {bv21}\nWarnings: {warnings}\n"))?;
    for note in notes {
        let prefix = match note.note_type() {
            NoteType::Ok => "OK     ",
            NoteType::Warning => "WARN   ",
            NoteType::Error => "ERROR  ",
            NoteType::Bv21Error => "BV2.1  ",
        };
        write(out, format!("{prefix} {}\n", note_to_string(note)))?;
    }
    Ok(())
}

/// Write the notes as JSON with summary counts.
pub fn write_json_report(notes: &[VerificationNote], out: &mut dyn Write) -> Result<()> {
    let (errors, bv21_errors, warnings) = counts(notes);
    let report = Report { errors, bv21_errors, warnings, notes };
    serde_json::to_writer_pretty(&mut *out, &report)
        .map_err(|e| Error::MiscError(format!("could not write report: {e}")))?;
    out.write_all(b"\n")
        .map_err(|e| Error::MiscError(format!("could not write report: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{NoteCode, VerificationNote};

    #[test]
    fn text_report_counts_and_lines() {
        let notes = vec![
            VerificationNote::new(NoteType::Error, NoteCode::MissingAssetmap),
            VerificationNote::new(NoteType::Warning, NoteCode::MissingFfoc),
            VerificationNote::new(NoteType::Bv21Error, NoteCode::InvalidStandard),
        ];
        let mut out = Vec::new();
        write_text_report(&notes, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Errors: 1\nBv2.1 errors: 1\nWarnings: 1\n"));
        assert!(text.contains("No ASSETMAP or ASSETMAP.xml was found."));
    }

    #[test]
    fn json_report_is_valid_json() {
        let notes = vec![VerificationNote::new(NoteType::Error, NoteCode::MissingAssetmap)
            .with_note("details")];
        let mut out = Vec::new();
        write_json_report(&notes, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["errors"], 1);
        assert_eq!(value["notes"][0]["code"], "MissingAssetmap");
    }
}
