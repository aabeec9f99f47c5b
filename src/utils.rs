//! 通用工具函数模块
//!
//! 服务器列表解析、公网地址校验以及查询名称处理

use crate::{DnsError, Result};
use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// 不可作为转发服务器的IPv4保留网段
const RESERVED_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// 不可作为转发服务器的IPv6保留网段
const RESERVED_V6: &[(Ipv6Addr, u8)] = &[
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32),
];

/// 判断地址是否为可路由的公网单播地址
///
/// 回环、私有、链路本地、组播、广播、未指定以及文档/保留网段都会被拒绝。
/// IPv4映射的IPv6地址按其IPv4形式判断。
pub fn is_public_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    if ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
    {
        return false;
    }

    !RESERVED_V4.iter().any(|&(addr, prefix)| {
        Ipv4Net::new(addr, prefix)
            .map(|net| net.contains(ip))
            .unwrap_or(false)
    })
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
        return false;
    }

    !RESERVED_V6.iter().any(|&(addr, prefix)| {
        Ipv6Net::new(addr, prefix)
            .map(|net| net.contains(ip))
            .unwrap_or(false)
    })
}

/// 解析单个服务器地址，不合法或非公网地址返回 `None`
pub fn parse_server_address(line: &str) -> Option<IpAddr> {
    let ip: IpAddr = line.trim().parse().ok()?;
    if !is_public_unicast(&ip) {
        return None;
    }

    // IPv4映射地址统一为IPv4形式
    match ip {
        IpAddr::V6(v6) => Some(v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip)),
        IpAddr::V4(_) => Some(ip),
    }
}

/// 解析按行分隔的服务器列表
///
/// 空行、无法解析的行以及非公网地址被静默跳过。
pub fn parse_server_list(text: &str) -> Vec<IpAddr> {
    text.lines().filter_map(parse_server_address).collect()
}

/// 校验服务器列表URL
pub fn validate_list_url(url: &str) -> Result<url::Url> {
    if url.is_empty() {
        return Err(DnsError::Config("URL cannot be empty".to_string()));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| DnsError::Config(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(DnsError::Config(format!("Unsupported URL scheme: {}", other))),
    }
}

/// 规范化主机名作为缓存键：小写并去掉末尾的点
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// 构造反向查询名称（in-addr.arpa / ip6.arpa）
pub fn reverse_name(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(73);
            for byte in v6.octets().iter().rev() {
                name.push_str(&format!("{:x}.{:x}.", byte & 0x0F, byte >> 4));
            }
            name.push_str("ip6.arpa.");
            name
        }
    }
}

/// 获取用户代理字符串
pub fn get_user_agent() -> String {
    format!("RatFailoverDNS/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_unicast_filter() {
        for addr in ["8.8.8.8", "1.1.1.1", "1.0.0.0", "2001:4860:4860::8888"] {
            assert!(is_public_unicast(&addr.parse().unwrap()), "{} should be public", addr);
        }

        for addr in [
            "0.0.0.0", "127.0.0.1", "10.1.2.3", "172.16.0.1", "192.168.1.1",
            "169.254.1.1", "224.0.0.1", "255.255.255.255", "100.64.0.1",
            "192.0.2.1", "::", "::1", "fe80::1", "fd00::1", "ff02::1", "2001:db8::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(!is_public_unicast(&addr.parse().unwrap()), "{} should be rejected", addr);
        }
    }

    #[test]
    fn test_parse_server_list_skips_garbage() {
        let list = "8.8.8.8\n\n  1.1.1.1  \nnot-an-ip\n192.168.0.1\n::ffff:9.9.9.9\n127.0.0.1\n";
        let servers = parse_server_list(list);
        assert_eq!(
            servers,
            vec![
                "8.8.8.8".parse::<IpAddr>().unwrap(),
                "1.1.1.1".parse::<IpAddr>().unwrap(),
                "9.9.9.9".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_validate_list_url() {
        assert!(validate_list_url("https://public-dns.info/nameservers.txt").is_ok());
        assert!(validate_list_url("http://127.0.0.1:8080/list").is_ok());
        assert!(validate_list_url("ftp://example.com/list").is_err());
        assert!(validate_list_url("").is_err());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM."), "example.com");
        assert_eq!(normalize_host(" google.com "), "google.com");
    }

    #[test]
    fn test_reverse_name() {
        assert_eq!(reverse_name(&"5.255.255.70".parse().unwrap()), "70.255.255.5.in-addr.arpa.");
        let v6 = reverse_name(&"2001:db8::1".parse().unwrap());
        assert!(v6.starts_with("1.0.0.0.0.0.0.0."));
        assert!(v6.ends_with("8.b.d.0.1.0.0.2.ip6.arpa."));
    }

    #[test]
    fn test_get_user_agent() {
        assert!(get_user_agent().starts_with("RatFailoverDNS/"));
    }
}
