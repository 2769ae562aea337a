//! Segment filename grammar: lexicographic variable-width integers, and
//! the four filename shapes listed in §4.2.
//!
//! Encoding: the first character is `'a' + (digits-1)` where `digits` is
//! the decimal digit count of the number (1..=20, covering the full
//! `u64` range), followed by the decimal digits themselves. Because the
//! prefix character sorts by digit count before the digits sort
//! lexicographically within a fixed width, textual sort order of these
//! tokens equals numeric order.

use std::fmt;

const MAX_DIGITS: usize = 20;

/// Encodes `n` as a lexicographically-ordered token.
#[must_use]
pub fn lex_encode(n: u64) -> String {
    let digits = if n == 0 { 1 } else { n.to_string().len() };
    let prefix = (b'a' + (digits as u8 - 1)) as char;
    format!("{prefix}{n}")
}

/// Decodes a lex-int token, requiring the entire input to be consumed.
#[must_use]
pub fn lex_decode(token: &str) -> Option<u64> {
    let mut chars = token.chars();
    let prefix = chars.next()?;
    if !prefix.is_ascii_lowercase() {
        return None;
    }
    let digits = (prefix as u8 - b'a' + 1) as usize;
    if digits == 0 || digits > MAX_DIGITS {
        return None;
    }
    let rest = chars.as_str();
    if rest.len() != digits || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Reject non-canonical encodings (e.g. leading zeros implying a
    // shorter digit count than the prefix claims), except for the
    // single-digit "0" itself.
    if digits > 1 && rest.starts_with('0') {
        return None;
    }
    rest.parse::<u64>().ok()
}

/// Which of the four on-disk filename shapes a parsed name used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameKind {
    CommittedPoint,
    CommittedRange,
    PendingPoint,
    PendingRange,
}

/// The numeric fields recovered from a segment filename, plus its level
/// (defaulted to 0 when the filename omits it — both the pending-point
/// shape, where omission is structural, and the legacy committed-range
/// form without a `-<level>` suffix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFilename {
    pub kind: FilenameKind,
    pub start_tx: u64,
    pub end_tx: u64,
    pub start_commit: u64,
    pub end_commit: u64,
    pub level: u32,
    pub pending: bool,
}

const DIFF_EXT: &str = ".diff";
const PENDING_EXT: &str = ".pending";

/// `<commit>-<tx>-<level>.diff`
#[must_use]
pub fn format_committed_point(commit: u64, tx: u64, level: u32) -> String {
    format!(
        "{}-{}-{}{DIFF_EXT}",
        lex_encode(commit),
        lex_encode(tx),
        lex_encode(u64::from(level))
    )
}

/// `<sc>.<st>-<ec>.<et>-<level>.diff`
#[must_use]
pub fn format_committed_range(
    start_commit: u64,
    start_tx: u64,
    end_commit: u64,
    end_tx: u64,
    level: u32,
) -> String {
    format!(
        "{}.{}-{}.{}-{}{DIFF_EXT}",
        lex_encode(start_commit),
        lex_encode(start_tx),
        lex_encode(end_commit),
        lex_encode(end_tx),
        lex_encode(u64::from(level))
    )
}

/// `<tx>.pending`
#[must_use]
pub fn format_pending_point(tx: u64) -> String {
    format!("{}{PENDING_EXT}", lex_encode(tx))
}

/// `<st>-<et>-<level>.pending`
#[must_use]
pub fn format_pending_range(start_tx: u64, end_tx: u64, level: u32) -> String {
    format!(
        "{}-{}-{}{PENDING_EXT}",
        lex_encode(start_tx),
        lex_encode(end_tx),
        lex_encode(u64::from(level))
    )
}

/// Parses a segment filename, recognising both extensions and all four
/// shapes. Returns `None` for anything that doesn't match the grammar.
#[must_use]
pub fn parse_filename(name: &str) -> Option<ParsedFilename> {
    if let Some(stem) = name.strip_suffix(PENDING_EXT) {
        return parse_pending(stem);
    }
    if let Some(stem) = name.strip_suffix(DIFF_EXT) {
        return parse_committed(stem);
    }
    None
}

fn parse_pending(stem: &str) -> Option<ParsedFilename> {
    if !stem.contains('-') {
        let tx = lex_decode(stem)?;
        return Some(ParsedFilename {
            kind: FilenameKind::PendingPoint,
            start_tx: tx,
            end_tx: tx,
            start_commit: 0,
            end_commit: 0,
            level: 0,
            pending: true,
        });
    }
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let start_tx = lex_decode(parts[0])?;
    let end_tx = lex_decode(parts[1])?;
    let level = lex_decode(parts[2])?;
    Some(ParsedFilename {
        kind: FilenameKind::PendingRange,
        start_tx,
        end_tx,
        start_commit: 0,
        end_commit: 0,
        level: u32::try_from(level).ok()?,
        pending: true,
    })
}

fn parse_committed(stem: &str) -> Option<ParsedFilename> {
    let parts: Vec<&str> = stem.split('-').collect();
    let any_dotted = parts.iter().any(|p| p.contains('.'));

    if !any_dotted {
        if parts.len() != 3 {
            return None;
        }
        let commit = lex_decode(parts[0])?;
        let tx = lex_decode(parts[1])?;
        let level = lex_decode(parts[2])?;
        return Some(ParsedFilename {
            kind: FilenameKind::CommittedPoint,
            start_tx: tx,
            end_tx: tx,
            start_commit: commit,
            end_commit: commit,
            level: u32::try_from(level).ok()?,
            pending: false,
        });
    }

    let (start_pair, end_pair, level) = match parts.len() {
        3 => (parts[0], parts[1], Some(parts[2])),
        2 => (parts[0], parts[1], None),
        _ => return None,
    };
    if level.is_some_and(|l| l.contains('.')) {
        return None;
    }
    let (sc, st) = split_dotted_pair(start_pair)?;
    let (ec, et) = split_dotted_pair(end_pair)?;
    let level = level.map_or(Some(0), lex_decode).and_then(|l| u32::try_from(l).ok())?;

    Some(ParsedFilename {
        kind: FilenameKind::CommittedRange,
        start_tx: st,
        end_tx: et,
        start_commit: sc,
        end_commit: ec,
        level,
        pending: false,
    })
}

fn split_dotted_pair(part: &str) -> Option<(u64, u64)> {
    let mut pieces = part.splitn(2, '.');
    let commit = lex_decode(pieces.next()?)?;
    let tx = lex_decode(pieces.next()?)?;
    Some((commit, tx))
}

impl fmt::Display for FilenameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CommittedPoint => "committed-point",
            Self::CommittedRange => "committed-range",
            Self::PendingPoint => "pending-point",
            Self::PendingRange => "pending-range",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_encode_decode_round_trips() {
        for n in [0u64, 1, 9, 10, 99, 100, 12345, u64::MAX] {
            let encoded = lex_encode(n);
            assert_eq!(lex_decode(&encoded), Some(n), "round trip failed for {n}");
        }
    }

    #[test]
    fn lex_encode_prefix_encodes_digit_count() {
        assert_eq!(lex_encode(0), "a0");
        assert_eq!(lex_encode(5), "a5");
        assert_eq!(lex_encode(42), "b42");
        assert_eq!(lex_encode(100), "c100");
    }

    #[test]
    fn lex_order_matches_numeric_order() {
        let mut nums = vec![1u64, 999, 10, 100_000, 2, 55];
        let mut encoded: Vec<String> = nums.iter().copied().map(lex_encode).collect();
        nums.sort_unstable();
        encoded.sort();
        let decoded: Vec<u64> = encoded.iter().map(|s| lex_decode(s).unwrap()).collect();
        assert_eq!(nums, decoded);
    }

    #[test]
    fn committed_point_round_trips() {
        let name = format_committed_point(7, 7, 0);
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.kind, FilenameKind::CommittedPoint);
        assert_eq!(parsed.start_commit, 7);
        assert_eq!(parsed.end_commit, 7);
        assert_eq!(parsed.start_tx, 7);
        assert_eq!(parsed.end_tx, 7);
        assert_eq!(parsed.level, 0);
        assert!(!parsed.pending);
    }

    #[test]
    fn committed_range_round_trips() {
        let name = format_committed_range(1, 1, 2, 5, 1);
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.kind, FilenameKind::CommittedRange);
        assert_eq!(parsed.start_commit, 1);
        assert_eq!(parsed.start_tx, 1);
        assert_eq!(parsed.end_commit, 2);
        assert_eq!(parsed.end_tx, 5);
        assert_eq!(parsed.level, 1);
    }

    #[test]
    fn committed_range_without_level_suffix_defaults_to_zero() {
        let legacy = format!(
            "{}.{}-{}.{}.diff",
            lex_encode(1),
            lex_encode(1),
            lex_encode(2),
            lex_encode(5)
        );
        let parsed = parse_filename(&legacy).unwrap();
        assert_eq!(parsed.kind, FilenameKind::CommittedRange);
        assert_eq!(parsed.level, 0);
    }

    #[test]
    fn pending_point_round_trips() {
        let name = format_pending_point(9);
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.kind, FilenameKind::PendingPoint);
        assert_eq!(parsed.start_tx, 9);
        assert_eq!(parsed.end_tx, 9);
        assert_eq!(parsed.level, 0);
        assert!(parsed.pending);
    }

    #[test]
    fn pending_range_round_trips() {
        let name = format_pending_range(3, 8, 2);
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.kind, FilenameKind::PendingRange);
        assert_eq!(parsed.start_tx, 3);
        assert_eq!(parsed.end_tx, 8);
        assert_eq!(parsed.level, 2);
        assert!(parsed.pending);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_filename("not-a-segment.txt").is_none());
        assert!(parse_filename("a1-a1-a0.diffx").is_none());
        assert!(lex_decode("").is_none());
        assert!(lex_decode("z99").is_none()); // digit count doesn't match
    }
}
