use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::esmtp_args::EsmtpArgs;
use crate::{InvalidData, ProtocolError};
use oxmilter_utils::ByteParsing;

/// An smtp recipient
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Recipient {
    recipient: BytesMut,
    esmtp_args: EsmtpArgs,
}

impl From<&[u8]> for Recipient {
    fn from(value: &[u8]) -> Self {
        Self {
            recipient: BytesMut::from_iter(value),
            esmtp_args: EsmtpArgs::default(),
        }
    }
}

impl Recipient {
    const CODE: u8 = b'R';
    /// The recipient as received by the milter client
    #[must_use]
    pub fn recipient(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.recipient)
    }

    /// The ESMTP parameters sent alongside `RCPT TO`, in arrival order.
    #[must_use]
    pub fn esmtp_args(&self) -> &EsmtpArgs {
        &self.esmtp_args
    }
}

impl Parsable for Recipient {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(recipient) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Received recipient package without recipient terminated by null byte in it",
                buffer,
            )
            .into());
        };

        let esmtp_args = EsmtpArgs::parse(buffer)?;

        Ok(Self {
            recipient,
            esmtp_args,
        })
    }
}

impl Writable for Recipient {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.recipient);
        buffer.put_u8(0);
        self.esmtp_args.write(buffer);
    }

    fn len(&self) -> usize {
        self.recipient.len() + 1 + self.esmtp_args.len()
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.recipient.is_empty() && self.esmtp_args.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_recipient_with_args() {
        let input = BytesMut::from("recipient1 recipient2\0arg1\0arg2\0");
        let recp = Recipient::parse(input).expect("failed parsing");

        assert_eq!(recp.recipient(), "recipient1 recipient2");
        let collected: Vec<_> = recp.esmtp_args().iter().collect();
        assert_eq!(collected, vec![("arg1", None), ("arg2", None)]);
    }

    #[test]
    fn test_recipient_missing_terminator() {
        let input = BytesMut::from("recipient1 arg1 arg2");
        let err = Recipient::parse(input).expect_err("expected decode error");
        assert!(matches!(err, ProtocolError::InvalidData(_)));
    }

    #[cfg(feature = "count-allocations")]
    #[test]
    fn test_parse_recipient() {
        let buffer = BytesMut::from("rcpt\0arg1\0arg2\0");
        let info = allocation_counter::measure(|| {
            let res = Recipient::parse(buffer);
            allocation_counter::opt_out(|| {
                assert!(res.is_ok());
            });
        });
        assert!(info.count_total > 0);
    }
}
