//! Byte cursor aware of the connection's client encoding.
//!
//! The query scanner takes every syntactic decision on single bytes. In
//! multi byte encodings a continuation byte may collide with ASCII
//! characters like `'` or `\`, so the scanner must know whether the byte
//! under the cursor starts a character or continues one. This module
//! centralizes that check, every other component takes the cursor and never
//! bare bytes.

use crate::error::Error;

/// Client side character encoding of statement text and character
/// parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClientEncoding {
    #[default]
    Utf8,
    /// Any single byte encoding (LATIN1, WIN125x, SQL_ASCII). No byte is a
    /// continuation byte.
    SingleByte,
    /// Shift-JIS. Lead bytes 0x81-0x9f and 0xe0-0xfc open a two byte
    /// character whose trail byte may fall into the ASCII range.
    ShiftJis,
    /// GBK / GB18030 two byte sequences, lead bytes 0x81-0xfe.
    Gbk,
    /// Big5, lead bytes 0x81-0xfe with trail bytes down to 0x40.
    Big5,
    /// EUC-JP / EUC-KR / EUC-CN family, lead bytes 0x8e-0xfe with high
    /// trail bytes.
    Euc,
}

impl ClientEncoding {
    /// Number of bytes of the character starting with `lead`, or `None` if
    /// `lead` cannot start a character.
    fn char_len(self, lead: u8) -> Option<usize> {
        match self {
            ClientEncoding::SingleByte => Some(1),
            ClientEncoding::Utf8 => match lead {
                0x00..=0x7f => Some(1),
                0xc2..=0xdf => Some(2),
                0xe0..=0xef => Some(3),
                0xf0..=0xf4 => Some(4),
                _ => None,
            },
            ClientEncoding::ShiftJis => match lead {
                0x81..=0x9f | 0xe0..=0xfc => Some(2),
                _ => Some(1),
            },
            ClientEncoding::Gbk | ClientEncoding::Big5 => match lead {
                0x81..=0xfe => Some(2),
                _ => Some(1),
            },
            ClientEncoding::Euc => match lead {
                0x8e..=0xfe => Some(2),
                _ => Some(1),
            },
        }
    }
}

/// Cursor over raw statement bytes which knows, for every position, whether
/// the byte is a character of its own or the continuation of a multi byte
/// character.
#[derive(Clone, Debug)]
pub struct EncodedCursor<'a> {
    bytes: &'a [u8],
    encoding: ClientEncoding,
    /// Remaining continuation bytes of the character most recently entered.
    pending: usize,
    pos: usize,
}

impl<'a> EncodedCursor<'a> {
    pub fn new(bytes: &'a [u8], encoding: ClientEncoding) -> Self {
        EncodedCursor {
            bytes,
            encoding,
            pending: 0,
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte at position `pos` after advancing the decoder state up to that
    /// position. Positions must be visited in non decreasing order.
    ///
    /// Fails with [`Error::Encoding`] on an invalid lead byte or a
    /// truncated multi byte sequence at the end of the text.
    pub fn byte_at(&mut self, pos: usize) -> Result<u8, Error> {
        while self.pos < pos {
            self.step()?;
        }
        if self.pending == 0 {
            let lead = *self.bytes.get(pos).ok_or(Error::Encoding)?;
            let char_len = self.encoding.char_len(lead).ok_or(Error::Encoding)?;
            if pos + char_len > self.bytes.len() {
                return Err(Error::Encoding);
            }
        }
        Ok(self.bytes[pos])
    }

    /// True while the current byte continues a multi byte character. No
    /// syntactic decision may be taken on such a byte.
    pub fn mbcs_non_ascii(&self) -> bool {
        self.pending > 0
    }

    fn step(&mut self) -> Result<(), Error> {
        if self.pending > 0 {
            self.pending -= 1;
        } else {
            let lead = self.bytes[self.pos];
            let char_len = self.encoding.char_len(lead).ok_or(Error::Encoding)?;
            self.pending = char_len - 1;
        }
        self.pos += 1;
        Ok(())
    }
}

/// Scan `bytes` in `encoding` and report `(byte, is_continuation)` pairs to
/// `f` until it returns `false`.
pub fn for_each_byte(
    bytes: &[u8],
    encoding: ClientEncoding,
    mut f: impl FnMut(usize, u8, bool) -> bool,
) -> Result<(), Error> {
    let mut cursor = EncodedCursor::new(bytes, encoding);
    for pos in 0..bytes.len() {
        let byte = cursor.byte_at(pos)?;
        if !f(pos, byte, cursor.mbcs_non_ascii()) {
            break;
        }
    }
    Ok(())
}

/// Continuation flag for every byte position of `bytes`. The scanner takes
/// its syntactic decisions against this map so a trail byte of a multi byte
/// character is never mistaken for a quote or backslash.
pub fn continuation_map(bytes: &[u8], encoding: ClientEncoding) -> Result<Vec<bool>, Error> {
    let mut map = vec![false; bytes.len()];
    for_each_byte(bytes, encoding, |pos, _, cont| {
        map[pos] = cont;
        true
    })?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_map_matches_cursor() {
        let text = "select 'ä'".as_bytes();
        let map = continuation_map(text, ClientEncoding::Utf8).unwrap();
        let expected: Vec<bool> = (0..text.len()).map(|i| i == 9).collect();
        assert_eq!(expected, map);
    }

    #[test]
    fn ascii_bytes_are_never_continuations() {
        let mut cursor = EncodedCursor::new(b"select 1", ClientEncoding::Utf8);
        for pos in 0..8 {
            cursor.byte_at(pos).unwrap();
            assert!(!cursor.mbcs_non_ascii());
        }
    }

    #[test]
    fn utf8_continuation_bytes_are_flagged() {
        // "ä" = 0xc3 0xa4
        let text = "select 'ä'".as_bytes();
        let mut cursor = EncodedCursor::new(text, ClientEncoding::Utf8);
        let mut continuations = Vec::new();
        for pos in 0..text.len() {
            cursor.byte_at(pos).unwrap();
            if cursor.mbcs_non_ascii() {
                continuations.push(pos);
            }
        }
        assert_eq!(vec![9], continuations);
    }

    #[test]
    fn sjis_trail_byte_may_look_like_a_quote() {    // 0x83 0x5c: the trail byte is ASCII backslash
        let text: &[u8] = &[0x83, 0x5c, b'\''];
        let mut cursor = EncodedCursor::new(text, ClientEncoding::ShiftJis);
        cursor.byte_at(0).unwrap();
        assert!(!cursor.mbcs_non_ascii());
        cursor.byte_at(1).unwrap();
        assert!(cursor.mbcs_non_ascii());
        cursor.byte_at(2).unwrap();
        assert!(!cursor.mbcs_non_ascii());
    }

    #[test]
    fn invalid_utf8_lead_byte_is_an_error() {
        let mut cursor = EncodedCursor::new(&[0xff], ClientEncoding::Utf8);
        assert!(matches!(cursor.byte_at(0), Err(Error::Encoding)));
    }

    #[test]
    fn truncated_multibyte_sequence_is_an_error() {
        let mut cursor = EncodedCursor::new(&[0xc3], ClientEncoding::Utf8);
        assert!(matches!(cursor.byte_at(0), Err(Error::Encoding)));
    }
}
