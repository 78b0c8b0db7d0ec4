//! An ordered `KEY[=VALUE]` list as sent alongside `MAIL FROM`/`RCPT TO`.

use bytes::{BufMut, BytesMut};

use crate::InvalidData;
use crate::ProtocolError;
use oxmilter_utils::ByteParsing;

/// ESMTP parameters from a `MAIL FROM`/`RCPT TO` command, preserving arrival
/// order. A bare `KEY` token maps to `None`; `KEY=VALUE` maps to `Some(value)`.
///
/// Receiving the same key twice is a decode error: sendmail/Postfix never
/// emit duplicates, and silently keeping the last one would hide a
/// malformed or adversarial MTA session from the application.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct EsmtpArgs {
    entries: Vec<(String, Option<String>)>,
}

impl EsmtpArgs {
    pub(crate) fn parse(buffer: BytesMut) -> Result<Self, ProtocolError> {
        if buffer.is_empty() {
            return Ok(Self::default());
        }

        let mut entries = Vec::new();
        let mut remainder = buffer;
        while !remainder.is_empty() {
            let Some(token) = remainder.delimited(0) else {
                return Err(InvalidData::new(
                    "ESMTP argument missing null byte delimiter",
                    remainder,
                )
                .into());
            };

            let (key, value) = match token.iter().position(|&b| b == b'=') {
                Some(idx) => {
                    let key = String::from_utf8_lossy(&token[..idx]).into_owned();
                    let value = String::from_utf8_lossy(&token[idx + 1..]).into_owned();
                    (key, Some(value))
                }
                None => (String::from_utf8_lossy(&token).into_owned(), None),
            };

            if entries.iter().any(|(k, _): &(String, _)| *k == key) {
                return Err(InvalidData::new(
                    "Duplicate ESMTP argument key",
                    BytesMut::from(key.as_bytes()),
                )
                .into());
            }

            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    pub(crate) fn write(&self, buffer: &mut BytesMut) {
        for (key, value) in &self.entries {
            buffer.extend_from_slice(key.as_bytes());
            if let Some(value) = value {
                buffer.put_u8(b'=');
                buffer.extend_from_slice(value.as_bytes());
            }
            buffer.put_u8(0);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, v)| k.len() + v.as_ref().map_or(0, |v| 1 + v.len()) + 1)
            .sum()
    }

    /// Whether any arguments were received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key, case-sensitively, in arrival order.
    ///
    /// Returns `None` if the key was not present, `Some(None)` for a bare
    /// `KEY` token, `Some(Some(value))` for `KEY=value`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    /// Iterate over the arguments in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn preserves_order() {
        let args = EsmtpArgs::parse(BytesMut::from("SIZE=10\0BODY=8BITMIME\0FLAG\0")).unwrap();
        let collected: Vec<_> = args.iter().collect();
        assert_eq!(
            collected,
            vec![
                ("SIZE", Some("10")),
                ("BODY", Some("8BITMIME")),
                ("FLAG", None),
            ]
        );
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = EsmtpArgs::parse(BytesMut::from("SIZE=1\0SIZE=2\0")).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidData(_)));
    }
}
