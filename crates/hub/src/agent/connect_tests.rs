use super::*;
use axum::http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn remote(ip: [u8; 4], port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
}

#[test]
fn parse_semver_accepts_bare_triple() {
    assert_eq!(parse_semver("1.2.3"), Some((1, 2, 3)));
}

#[test]
fn parse_semver_accepts_prerelease_and_build_suffixes() {
    assert_eq!(parse_semver("1.2.3-beta.1"), Some((1, 2, 3)));
    assert_eq!(parse_semver("1.2.3+abcdef"), Some((1, 2, 3)));
}

#[test]
fn parse_semver_rejects_missing_or_extra_components() {
    assert_eq!(parse_semver("1.2"), None);
    assert_eq!(parse_semver("1.2.3.4"), None);
    assert_eq!(parse_semver("not-a-version"), None);
}

#[test]
fn client_ip_prefers_cf_connecting_ip() {
    let mut headers = HeaderMap::new();
    headers.insert("cf-connecting-ip", "203.0.113.9".parse().unwrap());
    headers.insert("x-forwarded-for", "198.51.100.1, 10.0.0.1".parse().unwrap());
    assert_eq!(extract_client_ip(&headers, remote([127, 0, 0, 1], 9)), "203.0.113.9");
}

#[test]
fn client_ip_falls_back_to_first_x_forwarded_for_entry() {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "198.51.100.1, 10.0.0.1".parse().unwrap());
    assert_eq!(extract_client_ip(&headers, remote([127, 0, 0, 1], 9)), "198.51.100.1");
}

#[test]
fn client_ip_falls_back_to_remote_addr() {
    let headers = HeaderMap::new();
    assert_eq!(extract_client_ip(&headers, remote([192, 168, 1, 5], 9)), "192.168.1.5");
}
