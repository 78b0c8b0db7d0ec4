use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::decoding::Parsable;
use crate::encoding::Writable;
use crate::ProtocolError;
use crate::{error::STAGE_DECODING, InvalidData, NotEnoughData};
use oxmilter_utils::ByteParsing;

/// A marker for the connection family
#[allow(missing_docs)]
#[derive(Copy, Clone, PartialEq, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Family {
    Unknown = b'U',
    Unix = b'L',
    Inet = b'4',
    Inet6 = b'6',
}

impl Family {
    fn parse(buffer: &[u8]) -> Result<Self, ProtocolError> {
        match Family::try_from(buffer[0]) {
            Ok(f) => Ok(f),
            Err(_) => Err(InvalidData {
                msg: "Received unknown protocol family for connection info",
                offending_bytes: BytesMut::from_iter(&[buffer[0]]),
            }
            .into()),
        }
    }
}

/// The structured address of the connecting peer, parsed according to its
/// [`Family`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Address {
    /// An IPv4 peer address
    V4(Ipv4Addr),
    /// An IPv6 peer address
    V6(Ipv6Addr),
    /// A Unix domain socket path
    Unix(String),
    /// A raw literal that could not be classified further (`Family::Unknown`,
    /// or an IP family whose literal failed to parse)
    Raw(String),
}

impl Address {
    fn parse(family: Family, literal: &[u8]) -> Self {
        let text = String::from_utf8_lossy(literal).into_owned();
        match family {
            Family::Inet => text
                .parse::<Ipv4Addr>()
                .map(Address::V4)
                .unwrap_or(Address::Raw(text)),
            Family::Inet6 => text
                .parse::<Ipv6Addr>()
                .or_else(|_| text.parse::<IpAddr>().map(|ip| match ip {
                    IpAddr::V6(v6) => v6,
                    IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                }))
                .map(Address::V6)
                .unwrap_or(Address::Raw(text)),
            Family::Unix => Address::Unix(text),
            Family::Unknown => Address::Raw(text),
        }
    }

    fn as_string(&self) -> Cow<str> {
        match self {
            Address::V4(ip) => Cow::Owned(ip.to_string()),
            Address::V6(ip) => Cow::Owned(ip.to_string()),
            Address::Unix(path) | Address::Raw(path) => Cow::Borrowed(path),
        }
    }
}

/// Connect information about the smtp client
#[derive(Clone, PartialEq, Debug)]
pub struct Connect {
    hostname: BytesMut,
    /// The connection type connected to the milter client
    pub family: Family,
    /// On an IP connection, the port of the connection
    pub port: Option<u16>,
    address: Address,
}

impl Connect {
    const CODE: u8 = b'C';
    /// Create a new connect package
    #[must_use]
    pub fn new(hostname: &[u8], family: Family, port: Option<u16>, address: &[u8]) -> Self {
        Self {
            hostname: BytesMut::from_iter(hostname),
            port,
            address: Address::parse(family, address),
            family,
        }
    }
    /// Get the received hostname as as string-like type.
    #[must_use]
    pub fn hostname(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.hostname)
    }

    /// Get the structured peer address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the received address literal as a string-like type, regardless of
    /// whether it was recognized as an IPv4/IPv6 address.
    #[must_use]
    pub fn address_literal(&self) -> Cow<str> {
        self.address.as_string()
    }
}

impl Parsable for Connect {
    const CODE: u8 = Self::CODE;

    fn parse(mut buffer: BytesMut) -> Result<Self, ProtocolError> {
        let Some(hostname) = buffer.delimited(0) else {
            return Err(InvalidData::new(
                "Null-byte missing in connection package to delimit hostname",
                buffer,
            )
            .into());
        };

        let Some(family) = buffer.safe_split_to(1) else {
            return Err(NotEnoughData::new(
                STAGE_DECODING,
                "Connect",
                "Family missing",
                1,
                2,
                buffer,
            )
            .into());
        };
        let family = Family::parse(&family)?;

        let port = {
            match family {
                Family::Inet | Family::Inet6 => {
                    let Some(buf) = buffer.safe_split_to(2) else {
                        return Err(NotEnoughData::new(
                            STAGE_DECODING,
                            "Connect",
                            "Port missing",
                            2,
                            buffer.len(),
                            buffer,
                        )
                        .into());
                    };
                    let mut raw: [u8; 2] = [0; 2];
                    raw.copy_from_slice(&buf);

                    Some(u16::from_be_bytes(raw))
                }
                _ => None,
            }
        };

        let literal;
        if let Some(b'\0') = buffer.last() {
            literal = buffer.split_to(buffer.len() - 1);
        } else {
            literal = buffer;
        }

        let connect = Connect {
            hostname,
            family,
            port,
            address: Address::parse(family, &literal),
        };

        Ok(connect)
    }
}

impl Writable for Connect {
    fn write(&self, buffer: &mut BytesMut) {
        buffer.extend_from_slice(&self.hostname);
        buffer.put_u8(0);

        buffer.put_u8(self.family.into());

        buffer.put_u16(self.port.unwrap_or_default());

        buffer.extend_from_slice(self.address.as_string().as_bytes());
        buffer.put_u8(0);
    }

    fn len(&self) -> usize {
        self.hostname.len() + 1 + 1 + 2 + self.address.as_string().len() + 1
    }

    fn code(&self) -> u8 {
        Self::CODE
    }

    fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, Family};
    use crate::{commands::Connect, decoding::Parsable};
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;

    fn initialize() -> BytesMut {
        let hostname = b"localhost";
        let family = b'4';
        let port = 1234u16.to_be_bytes();
        let address = b"127.0.0.1";

        let mut read_buffer = Vec::new();
        read_buffer.extend(hostname);
        read_buffer.push(0);
        read_buffer.push(family);
        read_buffer.extend(port);
        read_buffer.extend(address);
        read_buffer.push(0);

        BytesMut::from_iter(read_buffer)
    }

    #[test]
    fn test_create_connect() {
        let connect = Connect::parse(initialize()).expect("Failed parsing connect");

        assert_eq!(b"localhost", connect.hostname.to_vec().as_slice());
        assert_eq!(Family::Inet, connect.family);
        assert_eq!(Some(1234), connect.port);
        assert_eq!(connect.address(), &Address::V4("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_connect_unix_socket_path() {
        let mut read_buffer = Vec::new();
        read_buffer.extend(b"localhost");
        read_buffer.push(0);
        read_buffer.push(b'L');
        read_buffer.extend(b"/var/run/milter.sock");
        read_buffer.push(0);

        let connect = Connect::parse(BytesMut::from_iter(read_buffer)).expect("failed parsing");
        assert_eq!(connect.port, None);
        assert_eq!(
            connect.address(),
            &Address::Unix("/var/run/milter.sock".to_string())
        );
    }

    #[cfg(feature = "count-allocations")]
    #[test]
    fn test_parse_connect() {
        let buffer = initialize();

        let info = allocation_counter::measure(|| {
            let res = Connect::parse(buffer);
            allocation_counter::opt_out(|| {
                assert!(res.is_ok());
            });
        });

        assert!(info.count_total > 0);
    }
}
