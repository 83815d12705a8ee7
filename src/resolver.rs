use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Result};

/// Default DNS port when the server flag gives only an address.
const DNS_PORT: u16 = 53;

/// Turn the `--server` flag into a socket address.
///
/// Accepts a bare IP (`8.8.8.8`, `2620:fe::fe`) or an IP with an explicit
/// port (`8.8.8.8:5353`, `[2620:fe::fe]:8053`). Hostnames are not
/// resolved; the target must be an IP literal.
pub fn parse_nameserver(input: &str) -> Result<SocketAddr> {
	let trimmed = input.trim();

	if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		return Ok(addr);
	}
	if let Ok(ip) = trimmed.parse::<IpAddr>() {
		return Ok(SocketAddr::new(ip, DNS_PORT));
	}

	bail!("'{}' is not an IP address with an optional port", input);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bare_address_gets_default_port() {
		let addr = parse_nameserver("9.9.9.9").unwrap();
		assert_eq!(addr, "9.9.9.9:53".parse().unwrap());
	}

	#[test]
	fn test_explicit_port_kept() {
		let addr = parse_nameserver("9.9.9.9:8053").unwrap();
		assert_eq!(addr.port(), 8053);
	}

	#[test]
	fn test_ipv6_forms() {
		let bare = parse_nameserver("2620:fe::fe").unwrap();
		assert_eq!(bare.port(), DNS_PORT);
		assert!(bare.is_ipv6());

		let with_port = parse_nameserver("[2620:fe::fe]:8053").unwrap();
		assert_eq!(with_port.port(), 8053);
	}

	#[test]
	fn test_surrounding_whitespace_tolerated() {
		let addr = parse_nameserver("  1.1.1.1  ").unwrap();
		assert_eq!(addr.port(), DNS_PORT);
	}

	#[test]
	fn test_hostnames_rejected() {
		assert!(parse_nameserver("dns.quad9.net").is_err());
		assert!(parse_nameserver("").is_err());
	}
}
