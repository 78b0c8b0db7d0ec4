//! Change the envelope sender (`MAIL FROM`)

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{InvalidData, ProtocolError};
use oxmilter_utils::ByteParsing;

/// Change the envelope sender address (`SMFIR_CHGFROM`)
#[derive(Debug, Clone)]
pub struct ChangeFrom {
    sender: BytesMut,
    /// Optional replacement ESMTP args, written verbatim after the sender
    args: Option<BytesMut>,
}

impl ChangeFrom {
    const CODE: u8 = b'e';

    /// Change the sender to `sender`, optionally replacing its ESMTP args
    #[must_use]
    pub fn new(sender: &[u8], args: Option<&[u8]>) -> Self {
        Self {
            sender: BytesMut::from_iter(sender),
            args: args.map(BytesMut::from_iter),
        }
    }

    /// The new envelope sender
    #[must_use]
    pub fn sender(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.sender)
    }

    /// The new ESMTP args, if any were set
    #[must_use]
    pub fn args(&self) -> Option<Cow<str>> {
        self.args.as_ref().map(|a| String::from_utf8_lossy(a))
    }
}

impl Parsable for ChangeFrom {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(sender) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received change-from package without null byte terminating the sender",
                buffer,
            )
            .into());
        };

        let args = if buffer.is_empty() {
            None
        } else if let Some(b'\0') = buffer.last() {
            Some(buffer.split_to(buffer.len() - 1))
        } else {
            Some(buffer)
        };

        Ok(Self { sender, args })
    }
}

impl Writable for ChangeFrom {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.sender);
        buffer.put_u8(0);
        if let Some(args) = &self.args {
            buffer.extend_from_slice(args);
            buffer.put_u8(0);
        }
    }

    fn len(&self) -> usize {
        self.sender.len() + 1 + self.args.as_ref().map_or(0, |a| a.len() + 1)
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
    fn test_roundtrip_with_args() {
        let change = ChangeFrom::new(b"new@example.com", Some(b"SIZE=10"));
        let mut buffer = BytesMut::new();
        change.write(&mut buffer);

        assert_eq!(buffer, BytesMut::from("new@example.com\0SIZE=10\0"));

        let parsed = ChangeFrom::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.sender(), "new@example.com");
        assert_eq!(parsed.args().as_deref(), Some("SIZE=10"));
    }

    #[test]
    fn test_roundtrip_without_args() {
        let change = ChangeFrom::new(b"new@example.com", None);
        let mut buffer = BytesMut::new();
        change.write(&mut buffer);

        assert_eq!(buffer, BytesMut::from("new@example.com\0"));

        let parsed = ChangeFrom::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.sender(), "new@example.com");
        assert_eq!(parsed.args(), None);
    }
}
