use std::borrow::Cow;

use bytes::{BufMut, BytesMut};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::esmtp_args::EsmtpArgs;
use crate::{InvalidData, ProtocolError};
use oxmilter_utils::ByteParsing;

/// Information about a mail to be processed
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Mail {
    sender: BytesMut,
    esmtp_args: EsmtpArgs,
}

impl From<&[u8]> for Mail {
    fn from(value: &[u8]) -> Self {
        Self {
            sender: BytesMut::from_iter(value),
            esmtp_args: EsmtpArgs::default(),
        }
    }
}

impl Mail {
    const CODE: u8 = b'M';
    /// The sender of this email
    #[must_use]
    pub fn sender(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.sender)
    }

    /// The ESMTP parameters sent alongside `MAIL FROM`, in the order the MTA
    /// sent them. Looking up a key yields `Some(None)` for a bare `KEY`
    /// token and `Some(Some(value))` for `KEY=value`.
    #[must_use]
    pub fn esmtp_args(&self) -> &EsmtpArgs {
        &self.esmtp_args
    }
}

impl Parsable for Mail {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(sender) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Null-byte missing in mail package to sender hostname",
                buffer,
            )
            .into());
        };

        let esmtp_args = EsmtpArgs::parse(buffer)?;

        Ok(Self { sender, esmtp_args })
    }
}

impl Writable for Mail {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.sender);
        buffer.put_u8(0);
        self.esmtp_args.write(buffer);
    }

    fn len(&self) -> usize {
        self.sender.len() + 1 + self.esmtp_args.len()
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        self.sender.is_empty() && self.esmtp_args.is_empty()
    }
}

/// SMTP Data command has been sent
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Data;

impl Data {
    const CODE: u8 = b'T';
}

impl Parsable for Data {
    const CODE: u8 = Self::CODE;

    fn parse(_buffer: BytesMut) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

impl Writable for Data {
    fn write(&self, _buffer: &mut BytesMut) {}

    fn len(&self) -> usize {
        0
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoding::Parsable;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mail_with_args() {
        let input = BytesMut::from("sender\0SIZE=1024\0BODY=8BITMIME\0");
        let mail = Mail::parse(input).expect("failed parsing mail");

        assert_eq!(mail.sender(), "sender");
        assert_eq!(
            mail.esmtp_args().get("SIZE"),
            Some(Some("1024".to_string()).as_deref())
        );
        assert_eq!(
            mail.esmtp_args().get("BODY"),
            Some(Some("8BITMIME".to_string()).as_deref())
        );
    }

    #[test]
    fn test_mail_without_args() {
        let input = BytesMut::from("sender\0");
        let mail = Mail::parse(input).expect("failed parsing mail");

        assert_eq!(mail.sender(), "sender");
        assert!(mail.esmtp_args().is_empty());
    }

    #[test]
    fn test_mail_missing_terminator() {
        let input = BytesMut::from("senderarg1arg2");
        let err = Mail::parse(input).expect_err("expected a decode error");
        assert!(matches!(err, ProtocolError::InvalidData(_)));
    }

    #[test]
    fn test_mail_duplicate_key_is_error() {
        let input = BytesMut::from("sender\0SIZE=1\0SIZE=2\0");
        let err = Mail::parse(input).expect_err("expected duplicate key to error");
        assert!(matches!(err, ProtocolError::InvalidData(_)));
    }

    #[cfg(feature = "count-allocations")]
    #[test]
    fn test_parse_mail() {
        let buffer = BytesMut::from("sender\0arg1\0arg2\0");
        let info = allocation_counter::measure(|| {
            let res = Mail::parse(buffer);
            allocation_counter::opt_out(|| {
                assert!(res.is_ok());
            });
        });
        assert!(info.count_total > 0);
    }
}
