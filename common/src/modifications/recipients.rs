//! Add or delete recipients

use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::{InvalidData, ProtocolError};
use oxmilter_utils::ByteParsing;

#[derive(Debug, Clone)]

///Does not change To in Header
pub struct AddRecipient {
    recipient: BytesMut,
}

impl AddRecipient {
    const CODE: u8 = b'+';

    /// Add the specified recipient
    #[must_use]
    pub fn new(recipient: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
        }
    }

    /// The recipient to add
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }
}

impl Parsable for AddRecipient {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received add recipient package without null byte terminating it",
                buffer,
            )
            .into());
        };

        Ok(Self { recipient })
    }
}

impl Writable for AddRecipient {
    ///buffer = recipients
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
/// Does not change To in Header
pub struct DeleteRecipient {
    recipient: BytesMut,
}

impl DeleteRecipient {
    const CODE: u8 = b'-';

    /// Delete the specified recipient
    #[must_use]
    pub fn new(recipient: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
        }
    }

    /// The (exact) recipient to be deleted
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }
}

impl Parsable for DeleteRecipient {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received delete recipient package without null byte terminating it",
                buffer,
            )
            .into());
        };

        Ok(Self { recipient })
    }
}

impl Writable for DeleteRecipient {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Add a recipient, including ESMTP arguments (`SMFIR_ADDRCPT_PAR`)
#[derive(Debug, Clone)]
pub struct AddRecipientWithArgs {
    recipient: BytesMut,
    args: BytesMut,
}

impl AddRecipientWithArgs {
    const CODE: u8 = b'2';

    /// Add the specified recipient, with raw ESMTP args appended verbatim
    /// after the recipient (space separated, as sent by the MTA on `RCPT
    /// TO`).
    #[must_use]
    pub fn new(recipient: &[u8], args: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(recipient),
            args: BytesMut::from_iter(args),
        }
    }

    /// The recipient to add
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }

    /// The raw ESMTP argument string accompanying the recipient
    #[must_use]
    pub fn args(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.args)
    }
}

impl Parsable for AddRecipientWithArgs {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received add recipient (with args) package without null byte terminating the recipient",
                buffer,
            )
            .into());
        };

        let args = {
            if let Some(b'\0') = buffer.last() {
                buffer.split_to(buffer.len() - 1)
            } else {
                buffer
            }
        };

        Ok(Self { recipient, args })
    }
}

impl Writable for AddRecipientWithArgs {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
        buffer.extend_from_slice(&self.args);
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1 + self.args.len() + 1
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

    #[test]
    fn test_add_recipient() {
        let mut buffer = BytesMut::new();
        let add_rcpt = AddRecipient {
            recipient: BytesMut::from("alex@gmail"),
        };
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer.len(), add_rcpt.len());
        assert_eq!(buffer, BytesMut::from("alex@gmail\0"));
    }

    #[test]
    fn test_delete_recipient() {
        let mut buffer = BytesMut::new();
        let add_rcpt = AddRecipient {
            recipient: BytesMut::from("alex@gmail"),
        };
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer.len(), add_rcpt.len());
        assert_eq!(buffer, BytesMut::from("alex@gmail\0"));
    }

    #[test]
    fn test_add_recipient_with_args_roundtrip() {
        let add_rcpt = AddRecipientWithArgs::new(b"alex@gmail", b"SIZE=10 BODY=8BITMIME");
        let mut buffer = BytesMut::new();
        add_rcpt.write(&mut buffer);

        assert_eq!(buffer, BytesMut::from("alex@gmail\0SIZE=10 BODY=8BITMIME\0"));

        let parsed = AddRecipientWithArgs::parse(buffer).expect("failed parsing");
        assert_eq!(parsed.recipient(), "alex@gmail");
        assert_eq!(parsed.args(), "SIZE=10 BODY=8BITMIME");
    }
}
