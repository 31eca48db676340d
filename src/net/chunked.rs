//! Incremental `Transfer-Encoding: chunked` decoding.
//!
//! Shared by the server payload reader and the client response reader. The
//! decoder is fed whatever bytes are buffered and reports how many it used;
//! unused bytes (a partial size line, say) stay with the caller until more
//! input arrives.

use bytes::BytesMut;

/// Longest accepted chunk-size field, in hex digits.
const MAX_SIZE_DIGITS: usize = 16;

/// Most bytes of trailer fields accepted after the last chunk.
pub const MAX_TRAILER_SIZE: usize = 8 * 1024;

/// Errors in chunked framing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DechunkError {
    #[error("chunk size is not ASCII")]
    SizeNotAscii,
    #[error("chunk size is not a hex number")]
    SizeNotANumber,
    #[error("chunk size line too long")]
    SizeTooLong,
    #[error("expected CRLF after chunk data")]
    ExpectedCrLf,
    #[error("trailer section exceeds {} bytes", MAX_TRAILER_SIZE)]
    TrailerTooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dechunker {
    Size,
    Chunk(usize),
    CrLf,
    /// After the last chunk; counts trailer bytes seen so far.
    Ending(usize),
    Trailer(usize),
    Ended,
}

impl Default for Dechunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Dechunker {
    pub fn new() -> Self {
        Dechunker::Size
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Dechunker::Ended)
    }

    /// Decode as much of `src` as possible, appending body bytes to `dst`.
    /// Returns the number of input bytes consumed.
    pub fn decode(&mut self, src: &[u8], dst: &mut BytesMut) -> Result<usize, DechunkError> {
        let mut index = 0;
        loop {
            let rest = &src[index..];
            let used = match *self {
                Dechunker::Size => self.read_size(rest)?,
                Dechunker::Chunk(left) => {
                    let n = rest.len().min(left);
                    dst.extend_from_slice(&rest[..n]);
                    *self = if n == left {
                        Dechunker::CrLf
                    } else {
                        Dechunker::Chunk(left - n)
                    };
                    (n > 0).then_some(n)
                }
                Dechunker::CrLf => match find_crlf(rest) {
                    Some(0) => {
                        *self = Dechunker::Size;
                        Some(2)
                    }
                    Some(_) => return Err(DechunkError::ExpectedCrLf),
                    None if rest.len() >= 2 => return Err(DechunkError::ExpectedCrLf),
                    None => None,
                },
                Dechunker::Ending(seen) => match find_crlf(rest) {
                    Some(0) => {
                        *self = Dechunker::Ended;
                        Some(2)
                    }
                    Some(_) => {
                        *self = Dechunker::Trailer(seen);
                        Some(0)
                    }
                    None => {
                        check_trailer(seen + rest.len())?;
                        None
                    }
                },
                // Trailer fields are skipped.
                Dechunker::Trailer(seen) => match find_crlf(rest) {
                    Some(i) => {
                        let seen = seen + i + 2;
                        check_trailer(seen)?;
                        *self = Dechunker::Ending(seen);
                        Some(i + 2)
                    }
                    None => {
                        check_trailer(seen + rest.len())?;
                        None
                    }
                },
                Dechunker::Ended => None,
            };
            match used {
                Some(n) => index += n,
                None => return Ok(index),
            }
        }
    }

    fn read_size(&mut self, src: &[u8]) -> Result<Option<usize>, DechunkError> {
        let Some(line_end) = find_crlf(src) else {
            if src.len() > MAX_SIZE_DIGITS + 256 {
                return Err(DechunkError::SizeTooLong);
            }
            return Ok(None);
        };
        let line = &src[..line_end];
        let digits_end = line.iter().position(|&c| c == b';').unwrap_or(line.len());
        let digits = std::str::from_utf8(&line[..digits_end])
            .map_err(|_| DechunkError::SizeNotAscii)?
            .trim();
        if digits.len() > MAX_SIZE_DIGITS {
            return Err(DechunkError::SizeTooLong);
        }
        let len = usize::from_str_radix(digits, 16).map_err(|_| DechunkError::SizeNotANumber)?;

        *self = if len == 0 {
            Dechunker::Ending(0)
        } else {
            Dechunker::Chunk(len)
        };
        Ok(Some(line_end + 2))
    }
}

fn check_trailer(seen: usize) -> Result<(), DechunkError> {
    if seen > MAX_TRAILER_SIZE {
        return Err(DechunkError::TrailerTooLong);
    }
    Ok(())
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_size_line_is_left_unconsumed() {
        let mut d = Dechunker::new();
        let mut out = BytesMut::new();
        assert_eq!(d.decode(b"", &mut out), Ok(0));
        assert_eq!(d.decode(b"2", &mut out), Ok(0));
        assert_eq!(d.decode(b"2\r", &mut out), Ok(0));
        assert_eq!(d.decode(b"2\r\n", &mut out), Ok(3));
        assert_eq!(d, Dechunker::Chunk(2));
    }

    #[test]
    fn decodes_across_split_input_with_extensions_and_trailers() {
        let input = b"3;name=x\r\nabc\r\n2\r\nde\r\n0\r\nExpires: never\r\n\r\nleftover";
        let mut d = Dechunker::new();
        let mut out = BytesMut::new();

        let first = d.decode(&input[..12], &mut out).unwrap();
        let second = d.decode(&input[first..], &mut out).unwrap();

        assert!(d.is_ended());
        assert_eq!(&out[..], b"abcde");
        assert_eq!(&input[first + second..], b"leftover");
    }

    #[test]
    fn rejects_garbage_size_and_missing_crlf() {
        let mut out = BytesMut::new();
        assert_eq!(
            Dechunker::new().decode(b"zz\r\n", &mut out),
            Err(DechunkError::SizeNotANumber)
        );
        assert_eq!(
            Dechunker::new().decode(b"1\r\naXY", &mut out),
            Err(DechunkError::ExpectedCrLf)
        );
    }

    #[test]
    fn unterminated_trailer_is_bounded() {
        let mut input = b"0\r\nX-Trailer: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_TRAILER_SIZE));
        let mut out = BytesMut::new();

        let mut d = Dechunker::new();
        assert_eq!(d.decode(&input[..64], &mut out), Ok(3));
        assert_eq!(d.decode(&input[3..], &mut out), Err(DechunkError::TrailerTooLong));
    }

    #[test]
    fn many_small_trailer_lines_are_bounded() {
        let mut input = b"0\r\n".to_vec();
        while input.len() <= MAX_TRAILER_SIZE + 16 {
            input.extend_from_slice(b"X-A: b\r\n");
        }
        let mut out = BytesMut::new();
        assert_eq!(
            Dechunker::new().decode(&input, &mut out),
            Err(DechunkError::TrailerTooLong)
        );
    }
}
