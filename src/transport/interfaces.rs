//! Host IPv4 interface discovery.
//!
//! The network device sits on a USB/RNDIS link that hands the host an
//! address in its private range; reading the host's own addresses tells us
//! which `/24` the device is on.

use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Matches `IPv4 Address. . . : a.b.c.d` (ipconfig) and `inet a.b.c.d` (ip/ifconfig).
static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:IPv4 Address[^:\n]*:\s*|\binet\s+(?:addr:)?)([0-9]{1,3}(?:\.[0-9]{1,3}){3})")
        .expect("IPv4 pattern is valid")
});

/// Lists the host's IPv4 addresses.
pub trait InterfaceSource: Send + Sync {
    /// Returns every configured IPv4 address; failures yield an empty list.
    fn ipv4_addresses(&self) -> Pin<Box<dyn Future<Output = Vec<Ipv4Addr>> + Send + '_>>;
}

/// Reads addresses from the host's network tooling.
#[derive(Debug, Clone)]
pub struct SystemInterfaces {
    timeout: Duration,
}

impl Default for SystemInterfaces {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl SystemInterfaces {
    /// Creates a source whose tool invocation is bounded by `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn collect(&self) -> Vec<Ipv4Addr> {
        let (program, args): (&str, &[&str]) = if cfg!(windows) {
            ("ipconfig", &[])
        } else {
            ("ip", &["-4", "-o", "addr", "show"])
        };

        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => parse_ipv4_addresses(&String::from_utf8_lossy(&output.stdout)),
            Ok(Err(e)) => {
                tracing::debug!("could not run {}: {}", program, e);
                Vec::new()
            }
            Err(_) => {
                tracing::debug!("{} timed out", program);
                Vec::new()
            }
        }
    }
}

impl InterfaceSource for SystemInterfaces {
    fn ipv4_addresses(&self) -> Pin<Box<dyn Future<Output = Vec<Ipv4Addr>> + Send + '_>> {
        Box::pin(self.collect())
    }
}

/// Extracts IPv4 addresses from `ipconfig` or `ip addr` output, in order.
#[must_use]
pub fn parse_ipv4_addresses(output: &str) -> Vec<Ipv4Addr> {
    IPV4_PATTERN
        .captures_iter(output)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipconfig() {
        let output = "\
Ethernet adapter Ethernet 3:

   Connection-specific DNS Suffix  . : lan
   IPv4 Address. . . . . . . . . . . : 172.16.42.42
   Subnet Mask . . . . . . . . . . . : 255.255.255.0

Wireless LAN adapter Wi-Fi:

   IPv4 Address. . . . . . . . . . . : 192.168.1.23(Preferred)
";
        assert_eq!(
            parse_ipv4_addresses(output),
            vec![Ipv4Addr::new(172, 16, 42, 42), Ipv4Addr::new(192, 168, 1, 23)]
        );
    }

    #[test]
    fn test_parse_ip_addr() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
4: usb0    inet 172.16.7.166/24 brd 172.16.7.255 scope global dynamic usb0\\       valid_lft 42000sec
";
        assert_eq!(
            parse_ipv4_addresses(output),
            vec![Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(172, 16, 7, 166)]
        );
    }

    #[test]
    fn test_parse_skips_invalid_octets() {
        assert!(parse_ipv4_addresses("inet 999.1.1.1/8").is_empty());
    }
}
