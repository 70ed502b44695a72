//! The archives journal codec (§4.F): a human-readable, line-oriented,
//! git-diff-friendly encoding of a [`Catalog`]'s archives.
//!
//! The format is deliberately not JSON despite the `known-archives.json`
//! filename convention it's written under — the literal format is:
//!
//! ```text
//! # modvault known-archives journal v1
//! archives: # i=intra1 j=intra2 a=archive_hash x=archive_size h=file_hash s=file_size
//! i:"x.txt", a:"2f9c...", x:1024, h:"7ab1...", s:10
//! i:"y.txt", a:"2f9c...", x:1024, h:"44de...", s:20
//! # end known-archives
//! ```
//!
//! Archives are emitted sorted by `archive_hash`; within an archive, files
//! are emitted sorted by their `intra_path` join. Both orderings are
//! contractual: re-emitting an unchanged catalog must reproduce the file
//! byte-for-byte.

use modvault_catalog::{Archive, FileInArchive};
use modvault_hash::{Hash, TruncatedHash};

const HEADER: &str = "# modvault known-archives journal v1";
const SECTION_HEADER: &str =
    "archives: # i=intra1 j=intra2 a=archive_hash x=archive_size h=file_hash s=file_size";
const FOOTER: &str = "# end known-archives";

#[derive(Debug, thiserror::Error)]
#[error("malformed journal at line {lineno}: {reason}")]
pub struct JournalParseError {
    pub lineno: usize,
    pub reason: String,
}

impl JournalParseError {
    fn at(lineno: usize, reason: impl Into<String>) -> Self {
        Self {
            lineno,
            reason: reason.into(),
        }
    }
}

/// Encode every archive in `archives` into the journal text format.
///
/// `archives` may be given in any order; the encoder re-sorts by
/// `archive_hash` before emitting, satisfying the contractual ordering.
#[must_use]
pub fn encode<'a>(archives: impl Iterator<Item = &'a Archive>) -> String {
    let mut sorted: Vec<&Archive> = archives.collect();
    sorted.sort_by(|a, b| a.archive_hash.to_hex().cmp(&b.archive_hash.to_hex()));

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(SECTION_HEADER);
    out.push('\n');

    for archive in sorted {
        let mut files: Vec<&FileInArchive> = archive.files().iter().collect();
        files.sort_by(|a, b| a.intra_path_joined().cmp(&b.intra_path_joined()));
        for file in files {
            out.push_str(&encode_row(archive, file));
            out.push('\n');
        }
    }

    out.push_str(FOOTER);
    out.push('\n');
    out
}

fn encode_row(archive: &Archive, file: &FileInArchive) -> String {
    let mut row = format!("i:\"{}\"", file.intra_path[0]);
    if let Some(second) = file.intra_path.get(1) {
        row.push_str(&format!(", j:\"{second}\""));
    }
    row.push_str(&format!(
        ", a:\"{}\", x:{}, h:\"{}\", s:{}",
        archive.archive_hash,
        archive.archive_size,
        file.hash.truncate(),
        file.size,
    ));
    row
}

/// Parse a journal text file into the [`Archive`]s it describes.
///
/// Archives are reconstructed in file order: rows are grouped by `(a, x)`
/// — a change in either value starts a new archive. The caller is
/// responsible for inserting the results into a fresh [`Catalog`]; this
/// function performs no duplicate-detection of its own.
///
/// Note that `h` stores only the [`TruncatedHash`] of each file — the
/// journal never round-trips full file hashes, only archive hashes. The
/// `Archive`s this returns carry [`TruncatedHash`]-derived content hashes
/// widened with trailing zero bytes; callers that need the original full
/// hash must keep it in the pickled memo (§4.C), not the journal.
pub fn parse(text: &str) -> Result<Vec<Archive>, JournalParseError> {
    let mut lines = text.lines().enumerate();

    let (header_no, header_line) = lines
        .next()
        .ok_or_else(|| JournalParseError::at(0, "empty journal"))?;
    if header_line != HEADER {
        return Err(JournalParseError::at(header_no + 1, "unexpected header line"));
    }

    let (section_no, section_line) = lines
        .next()
        .ok_or_else(|| JournalParseError::at(header_no + 1, "missing archives section"))?;
    if section_line != SECTION_HEADER {
        return Err(JournalParseError::at(section_no + 1, "unexpected archives section header"));
    }

    let mut groups: Vec<(Hash, u64, Vec<FileInArchive>)> = Vec::new();

    loop {
        let (lineno, line) = lines
            .next()
            .ok_or_else(|| JournalParseError::at(section_no + 1, "journal missing footer"))?;

        if line == FOOTER {
            break;
        }

        let row = parse_row(line).map_err(|reason| JournalParseError::at(lineno + 1, reason))?;

        match groups.last_mut() {
            Some((archive_hash, archive_size, files))
                if *archive_hash == row.archive_hash && *archive_size == row.archive_size =>
            {
                files.push(row.file);
            }
            _ => groups.push((row.archive_hash, row.archive_size, vec![row.file])),
        }
    }

    if lines.next().is_some() {
        return Err(JournalParseError::at(0, "content found after footer"));
    }

    Ok(groups
        .into_iter()
        .map(|(archive_hash, archive_size, files)| Archive::new(archive_hash, archive_size, files))
        .collect())
}

struct ParsedRow {
    archive_hash: Hash,
    archive_size: u64,
    file: FileInArchive,
}

fn parse_row(line: &str) -> Result<ParsedRow, String> {
    let mut intra_path: Vec<String> = Vec::new();
    let mut archive_hash: Option<Hash> = None;
    let mut archive_size: Option<u64> = None;
    let mut truncated_hash: Option<TruncatedHash> = None;
    let mut size: Option<u64> = None;

    for field in line.split(", ") {
        let (key, value) = field
            .split_once(':')
            .ok_or_else(|| format!("malformed field {field:?}"))?;
        match key {
            "i" => intra_path_push(&mut intra_path, 0, value)?,
            "j" => intra_path_push(&mut intra_path, 1, value)?,
            "a" => archive_hash = Some(parse_hash(value)?),
            "x" => archive_size = Some(parse_u64(key, value)?),
            "h" => {
                truncated_hash = Some(
                    TruncatedHash::from_hex(unquote(value)?)
                        .map_err(|err| format!("malformed hash in field h: {err}"))?,
                );
            }
            "s" => size = Some(parse_u64(key, value)?),
            other => return Err(format!("unknown field key {other:?}")),
        }
    }

    if intra_path.is_empty() {
        return Err("row is missing mandatory field i".to_string());
    }
    let archive_hash = archive_hash.ok_or("row is missing mandatory field a")?;
    let truncated_hash = truncated_hash.ok_or("row is missing mandatory field h")?;
    let archive_size = archive_size.unwrap_or(0);
    let size = size.unwrap_or(0);

    Ok(ParsedRow {
        archive_hash,
        archive_size,
        file: FileInArchive {
            hash: widen(truncated_hash),
            size,
            intra_path,
        },
    })
}

fn intra_path_push(intra_path: &mut Vec<String>, index: usize, value: &str) -> Result<(), String> {
    let segment = unquote(value)?.to_string();
    if intra_path.len() != index {
        return Err("intra-path segments out of order".to_string());
    }
    intra_path.push(segment);
    Ok(())
}

fn unquote(value: &str) -> Result<&str, String> {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| format!("expected quoted string, got {value:?}"))
}

fn parse_hash(value: &str) -> Result<Hash, String> {
    Hash::from_hex(unquote(value)?).map_err(|err| format!("malformed hash: {err}"))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("malformed integer for field {key}: {value:?}"))
}

/// The journal only stores the first half of a file's content hash.
/// The remaining bytes are zero-filled; a journal-reconstructed `Archive`
/// is suitable for diffing and catalog bookkeeping but its file hashes
/// must not be treated as full content hashes by any consumer that
/// verifies file bytes — those consumers read the pickled memo instead.
fn widen(truncated: TruncatedHash) -> Hash {
    let mut bytes = [0u8; modvault_hash::HASH_LEN];
    bytes[..modvault_hash::TRUNCATED_HASH_LEN].copy_from_slice(&hex_bytes(&truncated));
    Hash::from_bytes(bytes)
}

fn hex_bytes(truncated: &TruncatedHash) -> [u8; modvault_hash::TRUNCATED_HASH_LEN] {
    let hex = truncated.to_hex();
    let decoded = hex::decode(hex).expect("TruncatedHash::to_hex always produces valid hex");
    decoded
        .try_into()
        .expect("TruncatedHash::to_hex always produces TRUNCATED_HASH_LEN bytes")
}
