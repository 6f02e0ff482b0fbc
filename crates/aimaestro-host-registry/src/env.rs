//! Host-environment discovery: hostname and local addresses.
//!
//! The concrete enumeration mechanism is intentionally narrow and swappable
//! (a [`HostEnvironment`] trait) so tests can supply a fixed environment
//! instead of depending on the real network stack.

use std::net::Ipv4Addr;

/// Supplies the facts [`crate::registry::HostRegistry::self_host`] needs
/// about the machine it's running on.
pub trait HostEnvironment: Send + Sync {
	/// The machine's hostname, uncanonicalized.
	fn hostname(&self) -> String;
	/// All IPv4 addresses assigned to local interfaces.
	fn local_ipv4_addrs(&self) -> Vec<Ipv4Addr>;
}

/// Real-OS implementation of [`HostEnvironment`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostEnvironment;

impl HostEnvironment for SystemHostEnvironment {
	fn hostname(&self) -> String {
		hostname_fallback()
	}

	fn local_ipv4_addrs(&self) -> Vec<Ipv4Addr> {
		// No portable std API enumerates interfaces, so fall back to the
		// well-known "connect a UDP socket, read back the local address"
		// trick to discover the outbound-facing address. This intentionally
		// finds at most one address; hosts with multiple NICs that need
		// precise selection should supply a custom `HostEnvironment`.
		std::net::UdpSocket::bind("0.0.0.0:0")
			.and_then(|sock| {
				sock.connect("8.8.8.8:80")?;
				sock.local_addr()
			})
			.ok()
			.and_then(|addr| match addr.ip() {
				std::net::IpAddr::V4(v4) => Some(vec![v4]),
				std::net::IpAddr::V6(_) => None,
			})
			.unwrap_or_default()
	}
}

fn hostname_fallback() -> String {
	std::env::var("HOSTNAME")
		.or_else(|_| std::env::var("COMPUTERNAME"))
		.unwrap_or_else(|_| "localhost".to_string())
}

/// Priority tier for preferred-IP selection: lower sorts first.
fn priority(addr: &Ipv4Addr) -> u8 {
	let o = addr.octets();
	if o[0] == 100 && (o[1] & 0b1100_0000) == 0b0100_0000 {
		0 // Tailscale CGNAT range 100.64.0.0/10
	} else if addr.is_private() {
		1 // RFC1918
	} else if addr.is_loopback() {
		u8::MAX
	} else {
		2
	}
}

/// Picks the preferred non-loopback address per the priority order:
/// Tailscale 100.x, then RFC1918, then first remaining non-loopback IPv4.
#[must_use]
pub fn preferred_address(addrs: &[Ipv4Addr]) -> Option<Ipv4Addr> {
	addrs
		.iter()
		.filter(|a| !a.is_loopback())
		.min_by_key(|a| priority(a))
		.copied()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefers_tailscale_over_private_over_public() {
		let addrs = vec![
			Ipv4Addr::new(8, 8, 8, 8),
			Ipv4Addr::new(192, 168, 1, 5),
			Ipv4Addr::new(100, 64, 0, 2),
		];
		assert_eq!(preferred_address(&addrs), Some(Ipv4Addr::new(100, 64, 0, 2)));
	}

	#[test]
	fn excludes_loopback() {
		let addrs = vec![Ipv4Addr::new(127, 0, 0, 1)];
		assert_eq!(preferred_address(&addrs), None);
	}

	#[test]
	fn falls_back_to_public_when_nothing_private() {
		let addrs = vec![Ipv4Addr::new(8, 8, 8, 8)];
		assert_eq!(preferred_address(&addrs), Some(Ipv4Addr::new(8, 8, 8, 8)));
	}
}
