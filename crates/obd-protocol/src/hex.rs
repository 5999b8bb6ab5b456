//! Response text to hex digit helpers shared by the decoders

/// Status line some adapters print before the first reply after `ATSP0`
const SEARCHING: &str = "SEARCHING...";

/// Collapse a response into a solid, uppercase hex digit string.
///
/// Whitespace, the `>` prompt and a leading `SEARCHING...` status are
/// dropped. Anything else (including non-hex text such as `NO DATA`) is kept
/// so the caller's offset arithmetic sees it and rejects it.
pub(crate) fn compact(raw: &str) -> String {
    let compacted: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '>')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match compacted.strip_prefix(SEARCHING) {
        Some(rest) => rest.to_string(),
        None => compacted,
    }
}

/// [`compact`] each line of a multi-line response, skipping blank lines
///
/// Adapters answer one line per responding ECU, and every line carries its
/// own mode header. Collapsing them into one string would read the next
/// line's header as payload.
pub(crate) fn compact_lines(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(['\r', '\n'])
        .map(compact)
        .filter(|line| !line.is_empty())
}

/// Parse the two hex digits at `offset`, if present and well-formed
pub(crate) fn byte_at(hex: &str, offset: usize) -> Option<u8> {
    let digits = hex.get(offset..offset + 2)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_strips_noise() {
        assert_eq!(compact(" 41 0c 1a f8 \r\r>"), "410C1AF8");
        assert_eq!(compact("SEARCHING...\r41 0D 28"), "410D28");
    }

    #[test]
    fn test_compact_lines_splits_on_breaks() {
        let lines: Vec<String> =
            compact_lines("SEARCHING...\r43 01 03 01\r\n43 01 04 20\r\r>").collect();
        assert_eq!(lines, vec!["43010301", "43010420"]);
    }

    #[test]
    fn test_byte_at() {
        assert_eq!(byte_at("410C1AF8", 4), Some(0x1A));
        assert_eq!(byte_at("410C1AF8", 7), None);
        assert_eq!(byte_at("NODATA", 0), None);
        assert_eq!(byte_at("41+1", 2), None);
    }
}
