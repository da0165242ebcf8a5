use crate::error::{NetworkError, NetworkResult};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};

/// Default port used when a host/address string carries none.
pub const DEFAULT_PORT: u16 = 3413;

/// IPv4 or IPv6 endpoint with a port. Equality is by tag, octets, and port — two `Address`
/// values never compare equal across families even if one were an IPv4-mapped IPv6 address.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    V4 { octets: [u8; 4], port: u16 },
    V6 { octets: [u8; 16], port: u16 },
}

impl Default for Address {
    /// IPv4 loopback, default port.
    #[inline]
    fn default() -> Address {
        Address::V4 {
            octets: [127, 0, 0, 1],
            port: DEFAULT_PORT,
        }
    }
}

impl Address {
    #[inline]
    pub fn port(&self) -> u16 {
        match self {
            Address::V4 { port, .. } => *port,
            Address::V6 { port, .. } => *port,
        }
    }

    /// Parses one of the six accepted string shapes: `[v6]:port`, bare `v6`, `v4:port`,
    /// `hostname:port`, `v4`, `hostname`. Anything else is rejected as a `ParseError`.
    ///
    /// Hostname forms go through the platform resolver via `ToSocketAddrs`, preferring whichever
    /// family the resolver returns first (mirroring the host platform's own family preference).
    pub fn parse(text: &str) -> NetworkResult<Address> {
        if let Some(rest) = text.strip_prefix('[') {
            // `[v6]:port`
            let close = rest
                .find(']')
                .ok_or_else(|| NetworkError::ParseError(format!("unterminated bracket in '{}'", text)))?;
            let (host, tail) = rest.split_at(close);
            let tail = tail
                .strip_prefix("]:")
                .ok_or_else(|| NetworkError::ParseError(format!("expected ']:port' in '{}'", text)))?;
            let port: u16 = tail
                .parse()
                .map_err(|_| NetworkError::ParseError(format!("invalid port in '{}'", text)))?;
            let ip: Ipv6Addr = host
                .parse()
                .map_err(|_| NetworkError::ParseError(format!("invalid ipv6 address '{}'", host)))?;
            return Ok(Address::V6 { octets: ip.octets(), port });
        }

        let colons = text.matches(':').count();
        match colons {
            0 => {
                // bare v4 or bare hostname
                if let Ok(ip) = text.parse::<Ipv4Addr>() {
                    Ok(Address::V4 { octets: ip.octets(), port: DEFAULT_PORT })
                } else {
                    Self::resolve(text, DEFAULT_PORT)
                }
            }
            1 => {
                // `v4:port` or `hostname:port`
                let (host, port_str) = text
                    .rsplit_once(':')
                    .ok_or_else(|| NetworkError::ParseError(format!("expected 'host:port' in '{}'", text)))?;
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| NetworkError::ParseError(format!("invalid port in '{}'", text)))?;
                if let Ok(ip) = host.parse::<Ipv4Addr>() {
                    Ok(Address::V4 { octets: ip.octets(), port })
                } else {
                    Self::resolve(&format!("{}:{}", host, port), port)
                }
            }
            _ => {
                // bare v6 (no brackets, no port — the grammar requires >1 colon to disambiguate
                // from `hostname:port`)
                let ip: Ipv6Addr = text
                    .parse()
                    .map_err(|_| NetworkError::ParseError(format!("invalid ipv6 address '{}'", text)))?;
                Ok(Address::V6 { octets: ip.octets(), port: DEFAULT_PORT })
            }
        }
    }

    fn resolve(lookup: &str, port: u16) -> NetworkResult<Address> {
        let mut addrs = lookup
            .to_socket_addrs()
            .map_err(|err| NetworkError::ParseError(format!("dns lookup failed for '{}': {}", lookup, err)))?;
        match addrs.next() {
            Some(SocketAddr::V4(addr)) => Ok(Address::V4 { octets: addr.ip().octets(), port: addr.port() }),
            Some(SocketAddr::V6(addr)) => Ok(Address::V6 { octets: addr.ip().octets(), port: addr.port() }),
            None => {
                let _ = port;
                Err(NetworkError::ParseError(format!("dns lookup returned no results for '{}'", lookup)))
            }
        }
    }

    /// Builds an `Address` from a socket address, copying its octets and port verbatim.
    #[inline]
    pub fn from_socket_addr(addr: SocketAddr) -> Address {
        match addr {
            SocketAddr::V4(addr) => Address::V4 { octets: addr.ip().octets(), port: addr.port() },
            SocketAddr::V6(addr) => Address::V6 { octets: addr.ip().octets(), port: addr.port() },
        }
    }

    /// Inverse of `from_socket_addr`.
    #[inline]
    pub fn to_socket_addr(&self) -> SocketAddr {
        match self {
            Address::V4 { octets, port } => {
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(*octets), *port))
            }
            Address::V6 { octets, port } => {
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(*octets), *port, 0, 0))
            }
        }
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        match self {
            Address::V4 { octets, .. } => IpAddr::V4(Ipv4Addr::from(*octets)),
            Address::V6 { octets, .. } => IpAddr::V6(Ipv6Addr::from(*octets)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4 { octets, port } => {
                write!(f, "{}.{}.{}.{}:{}", octets[0], octets[1], octets[2], octets[3], port)
            }
            Address::V6 { octets, port } => {
                // `Ipv6Addr`'s own Display already lower-cases hex and compacts a zero-run to
                // `::` exactly once, matching the wire-format rule.
                write!(f, "[{}]:{}", Ipv6Addr::from(*octets), port)
            }
        }
    }
}

impl From<SocketAddr> for Address {
    #[inline]
    fn from(addr: SocketAddr) -> Address {
        Address::from_socket_addr(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_v4_loopback() {
        let addr = Address::default();
        assert_eq!(addr, Address::V4 { octets: [127, 0, 0, 1], port: DEFAULT_PORT });
    }

    #[test]
    fn parses_v4_with_port() {
        let addr = Address::parse("192.168.0.1:9000").unwrap();
        assert_eq!(addr, Address::V4 { octets: [192, 168, 0, 1], port: 9000 });
    }

    #[test]
    fn parses_bare_v4() {
        let addr = Address::parse("10.0.0.5").unwrap();
        assert_eq!(addr, Address::V4 { octets: [10, 0, 0, 5], port: DEFAULT_PORT });
    }

    #[test]
    fn parses_bracketed_v6_with_port() {
        let addr = Address::parse("[::1]:4242").unwrap();
        assert_eq!(addr, Address::V6 { octets: Ipv6Addr::LOCALHOST.octets(), port: 4242 });
    }

    #[test]
    fn parses_bare_v6() {
        let addr = Address::parse("::1").unwrap();
        assert_eq!(addr, Address::V6 { octets: Ipv6Addr::LOCALHOST.octets(), port: DEFAULT_PORT });
    }

    #[test]
    fn roundtrips_v4_through_format() {
        let addr = Address::parse("203.0.113.7:5555").unwrap();
        let text = addr.to_string();
        assert_eq!(Address::parse(&text).unwrap(), addr);
    }

    #[test]
    fn roundtrips_v6_through_format() {
        let addr = Address::parse("[2001:db8::1]:5555").unwrap();
        let text = addr.to_string();
        assert_eq!(Address::parse(&text).unwrap(), addr);
    }

    #[test]
    fn rejects_malformed_bracket() {
        assert!(Address::parse("[::1:9000").is_err());
    }

    #[test]
    fn from_and_to_socket_addr_roundtrip() {
        let sock: SocketAddr = "127.0.0.1:3413".parse().unwrap();
        let addr = Address::from_socket_addr(sock);
        assert_eq!(addr.to_socket_addr(), sock);
    }
}
