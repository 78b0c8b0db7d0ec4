use std::borrow::Cow;

use bytes::{BufMut, BytesMut};
use itertools::Itertools;

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{error::STAGE_DECODING, NotEnoughData};
use crate::{InvalidData, ProtocolError};
use oxmilter_utils::ByteParsing;

/// Accept this mail and skip any remaining stages for it.
#[derive(Debug, Clone)]
pub struct Accept;

impl Accept {
    const CODE: u8 = b'a';
}

impl Parsable for Accept {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Accept {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// (Silently) discard this mail without forwarding it
#[derive(Debug, Clone)]
pub struct Discard;

impl Discard {
    const CODE: u8 = b'd';
}

impl Parsable for Discard {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Discard {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject this mail, informing the smtp client about it
#[derive(Debug, Clone)]
pub struct Reject;

impl Reject {
    const CODE: u8 = b'r';
}

impl Parsable for Reject {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Reject {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Return a tempfail code to the smtp client
#[derive(Debug, Clone)]
pub struct Tempfail;

impl Tempfail {
    const CODE: u8 = b't';
}

impl Parsable for Tempfail {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Tempfail {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Skip this mail processing
#[derive(Debug, Clone)]
pub struct Skip;

impl Skip {
    const CODE: u8 = b's';
}

impl Parsable for Skip {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Skip {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Abandon this connection to the SMTP client entirely.
#[derive(Debug, Clone)]
pub struct CauseConnectionFail;

impl CauseConnectionFail {
    const CODE: u8 = b'f';
}

impl Parsable for CauseConnectionFail {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for CauseConnectionFail {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ask the MTA for more time before the next reply is expected.
#[derive(Debug, Clone)]
pub struct Progress;

impl Progress {
    const CODE: u8 = b'p';
}

impl Parsable for Progress {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Progress {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Enhanced status code, e.g. `5.7.1`
const ENHANCED_CODE_LENGTH: usize = 3;

/// Reject/tempfail with a specific SMTP reply text.
///
/// The wire format is a single NUL-terminated ASCII string of the shape
/// `smtp-code[ enh.code] text`, e.g. `550 5.7.1 not allowed`. This is one
/// string, not three NUL-delimited segments: the enhanced code and the
/// free-text message share the reply text sendmail prints back to the
/// SMTP client.
#[derive(Debug, Clone)]
pub struct Replycode {
    smtp_code: u16,
    enhanced_code: Option<[u16; ENHANCED_CODE_LENGTH]>,
    text: BytesMut,
}

impl Replycode {
    const CODE: u8 = b'y';

    /// Create a Replycode from an smtp code, an optional enhanced code and
    /// free text.
    ///
    /// `smtp_code` must be a 4xx or 5xx code. This constructor does not
    /// check that, since it is meant for application code building an
    /// outgoing reply; [`Self::parse`] rejects an out-of-range code on
    /// the way in, since that can only mean a malformed peer.
    #[must_use]
    pub fn new(smtp_code: u16, enhanced_code: Option<[u16; ENHANCED_CODE_LENGTH]>, text: &str) -> Self {
        Self {
            smtp_code,
            enhanced_code,
            text: BytesMut::from(text.as_bytes()),
        }
    }

    /// The free-text portion of the reply
    #[must_use]
    pub fn text(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.text)
    }

    /// The smtp return code, e.g. 550
    #[must_use]
    pub fn smtp_code(&self) -> u16 {
        self.smtp_code
    }

    /// The smtp enhanced return code, e.g. `[5, 7, 1]`, if present
    #[must_use]
    pub fn enhanced_code(&self) -> Option<[u16; ENHANCED_CODE_LENGTH]> {
        self.enhanced_code
    }
}

impl Parsable for Replycode {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(line) = buffer.delimited(0) else {
            return Err(NotEnoughData::new(
                STAGE_DECODING,
                "Replycode",
                "Missing nullbyte delimiter after reply text",
                1,
                0,
                buffer,
            )
            .into());
        };

        let mut parts = line.splitn(3, |&b| b == b' ');

        let Some(smtp_code_raw) = parts.next() else {
            return Err(InvalidData::new("Replycode missing smtp code", line).into());
        };
        let Ok(smtp_code) = std::str::from_utf8(smtp_code_raw).unwrap_or_default().parse::<u16>()
        else {
            return Err(InvalidData::new("Replycode smtp code is not a u16", line).into());
        };
        if !(400..=599).contains(&smtp_code) {
            return Err(InvalidData::new("Replycode smtp code must be a 4xx or 5xx code", line).into());
        }

        let rest: Vec<&[u8]> = parts.collect();
        let (enhanced_code, text) = match rest.as_slice() {
            [enhanced, text] if looks_like_enhanced_code(enhanced) => {
                (Some(parse_enhanced_code(enhanced)?), (*text).to_vec())
            }
            [enhanced, text] => {
                // Not actually an enhanced code, glue it back into the text.
                let mut joined = (*enhanced).to_vec();
                joined.push(b' ');
                joined.extend_from_slice(text);
                (None, joined)
            }
            [single] => (None, (*single).to_vec()),
            [] => (None, Vec::new()),
            _ => unreachable!("splitn(3, ..) yields at most 3 parts"),
        };

        Ok(Self {
            smtp_code,
            enhanced_code,
            text: BytesMut::from_iter(text),
        })
    }
}

fn looks_like_enhanced_code(candidate: &[u8]) -> bool {
    let dots = candidate.iter().filter(|&&b| b == b'.').count();
    dots == ENHANCED_CODE_LENGTH - 1
        && candidate
            .split(|&b| b == b'.')
            .all(|segment| !segment.is_empty() && segment.iter().all(u8::is_ascii_digit))
}

fn parse_enhanced_code(candidate: &[u8]) -> Result<[u16; ENHANCED_CODE_LENGTH], ProtocolError> {
    let mut code = [0u16; ENHANCED_CODE_LENGTH];
    for (slot, segment) in code.iter_mut().zip(candidate.split(|&b| b == b'.')) {
        let Ok(number) = std::str::from_utf8(segment).unwrap_or_default().parse() else {
            return Err(InvalidData::new(
                "invalid u16 in enhanced code",
                BytesMut::from_iter(candidate),
            )
            .into());
        };
        *slot = number;
    }
    Ok(code)
}

impl Writable for Replycode {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.put_slice(self.smtp_code.to_string().as_bytes());
        if let Some(enhanced) = self.enhanced_code {
            buffer.put_u8(b' ');
            buffer.put_slice(
                enhanced
                    .iter()
                    .map(ToString::to_string)
                    .join(".")
                    .as_bytes(),
            );
        }
        if !self.text.is_empty() {
            buffer.put_u8(b' ');
            buffer.put_slice(&self.text);
        }
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        let mut len = self.smtp_code.to_string().len();
        if self.enhanced_code.is_some() {
            len += 1 + 3 + 2; // space + "d.d.d" minimum width
        }
        if !self.text.is_empty() {
            len += 1 + self.text.len();
        }
        len + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_reply() {
        let input = BytesMut::from("550 5.7.1 not allowed\0");
        let parsed = Replycode::parse(input).expect("failed parsing");

        assert_eq!(parsed.smtp_code(), 550);
        assert_eq!(parsed.enhanced_code(), Some([5, 7, 1]));
        assert_eq!(parsed.text(), "not allowed");
    }

    #[test]
    fn test_parse_without_enhanced_code() {
        let input = BytesMut::from("421 try again later\0");
        let parsed = Replycode::parse(input).expect("failed parsing");

        assert_eq!(parsed.smtp_code(), 421);
        assert_eq!(parsed.enhanced_code(), None);
        assert_eq!(parsed.text(), "try again later");
    }

    #[test]
    fn test_roundtrip_write() {
        let code = Replycode::new(550, Some([5, 7, 1]), "not allowed");
        let mut buffer = BytesMut::new();
        code.write(&mut buffer);

        assert_eq!(&buffer[..], b"550 5.7.1 not allowed\0");

        let parsed = Replycode::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.smtp_code(), 550);
        assert_eq!(parsed.enhanced_code(), Some([5, 7, 1]));
        assert_eq!(parsed.text(), "not allowed");
    }
}
