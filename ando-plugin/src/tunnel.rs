use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A host pattern compiled to an anchored regex, the same technique the
/// IP-restriction plugin uses `ipnet` for CIDR compilation: a glob like
/// `*.internal.example.com` becomes `^.*\.internal\.example\.com$`.
pub struct CompiledGlob {
    re: Regex,
}

impl CompiledGlob {
    pub fn compile(pattern: &str) -> anyhow::Result<Self> {
        let mut re_str = String::from("^");
        for ch in pattern.chars() {
            match ch {
                '*' => re_str.push_str(".*"),
                '?' => re_str.push('.'),
                c if regex_syntax::is_meta_character(c) => {
                    re_str.push('\\');
                    re_str.push(c);
                }
                c => re_str.push(c),
            }
        }
        re_str.push('$');
        Ok(Self { re: Regex::new(&re_str).map_err(|e| anyhow::anyhow!("bad host glob {pattern}: {e}"))? })
    }

    pub fn matches(&self, host: &str) -> bool {
        self.re.is_match(host)
    }
}

pub struct TunnelPolicy {
    pub allowed_hosts: Vec<CompiledGlob>,
    pub allowed_ports: HashSet<u16>,
    pub idle_timeout: Duration,
}

impl TunnelPolicy {
    pub fn check(&self, host: &str, port: u16) -> Result<(), String> {
        if !self.allowed_ports.is_empty() && !self.allowed_ports.contains(&port) {
            return Err(format!("port {port} not in tunnel allow-list"));
        }
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.iter().any(|g| g.matches(host)) {
            return Err(format!("host {host} not in tunnel allow-list"));
        }
        Ok(())
    }
}

/// Cross-core shared counters for one route's tunnels — genuinely
/// shared across worker threads (a CONNECT target can be reached from
/// any worker), hence atomics rather than thread-local state.
#[derive(Default)]
pub struct TunnelCounters {
    pub active: AtomicU64,
    pub total: AtomicU64,
    pub total_bytes: AtomicU64,
}

impl TunnelCounters {
    pub fn on_open(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_close(&self, bytes: u64) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    ClosedByClient,
    ClosedByUpstream,
    IdleTimeout,
    Error,
}

/// Bidirectionally copy between a hijacked client stream and a freshly
/// dialed upstream stream until either side closes or the connection
/// goes idle for longer than `idle_timeout`. Both copiers race the idle
/// deadline independently — whichever fires first tears down both
/// halves.
pub async fn run_tunnel(
    mut client: TcpStream,
    mut upstream: TcpStream,
    counters: &TunnelCounters,
    idle_timeout: Duration,
) -> (TunnelOutcome, u64) {
    counters.on_open();
    let mut total_bytes: u64 = 0;
    let mut client_buf = vec![0u8; 16 * 1024];
    let mut upstream_buf = vec![0u8; 16 * 1024];

    let outcome = loop {
        let client_read = monoio::time::timeout(idle_timeout, client.read(client_buf));
        let upstream_read = monoio::time::timeout(idle_timeout, upstream.read(upstream_buf));

        monoio::select! {
            timed = client_read => {
                let Ok((res, buf)) = timed else { break TunnelOutcome::IdleTimeout };
                client_buf = buf;
                match res {
                    Ok(0) => break TunnelOutcome::ClosedByClient,
                    Ok(n) => {
                        total_bytes += n as u64;
                        let (res, buf) = upstream.write_all(client_buf[..n].to_vec()).await;
                        if res.is_err() {
                            break TunnelOutcome::Error;
                        }
                        let _ = buf;
                    }
                    Err(_) => break TunnelOutcome::Error,
                }
            }
            timed = upstream_read => {
                let Ok((res, buf)) = timed else { break TunnelOutcome::IdleTimeout };
                upstream_buf = buf;
                match res {
                    Ok(0) => break TunnelOutcome::ClosedByUpstream,
                    Ok(n) => {
                        total_bytes += n as u64;
                        let (res, buf) = client.write_all(upstream_buf[..n].to_vec()).await;
                        if res.is_err() {
                            break TunnelOutcome::Error;
                        }
                        let _ = buf;
                    }
                    Err(_) => break TunnelOutcome::Error,
                }
            }
        }
    };

    counters.on_close(total_bytes);
    (outcome, total_bytes)
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '\\' | '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_any_suffix() {
        let g = CompiledGlob::compile("*.internal.example.com").unwrap();
        assert!(g.matches("svc.internal.example.com"));
        assert!(!g.matches("svc.internal.example.com.evil.net"));
    }

    #[test]
    fn glob_without_wildcard_is_exact() {
        let g = CompiledGlob::compile("api.example.com").unwrap();
        assert!(g.matches("api.example.com"));
        assert!(!g.matches("api.example.com.evil.net"));
    }

    #[test]
    fn policy_rejects_disallowed_port() {
        let policy = TunnelPolicy {
            allowed_hosts: vec![],
            allowed_ports: [443].into_iter().collect(),
            idle_timeout: Duration::from_secs(60),
        };
        assert!(policy.check("anything", 8080).is_err());
        assert!(policy.check("anything", 443).is_ok());
    }

    #[test]
    fn policy_rejects_disallowed_host() {
        let policy = TunnelPolicy {
            allowed_hosts: vec![CompiledGlob::compile("*.example.com").unwrap()],
            allowed_ports: HashSet::new(),
            idle_timeout: Duration::from_secs(60),
        };
        assert!(policy.check("evil.net", 443).is_err());
        assert!(policy.check("api.example.com", 443).is_ok());
    }

    #[test]
    fn empty_allow_lists_permit_everything() {
        let policy = TunnelPolicy { allowed_hosts: vec![], allowed_ports: HashSet::new(), idle_timeout: Duration::from_secs(1) };
        assert!(policy.check("anything.at.all", 1).is_ok());
    }

    #[test]
    fn counters_track_open_close_and_bytes() {
        let counters = TunnelCounters::default();
        counters.on_open();
        counters.on_open();
        assert_eq!(counters.active.load(Ordering::Relaxed), 2);
        counters.on_close(100);
        assert_eq!(counters.active.load(Ordering::Relaxed), 1);
        assert_eq!(counters.total_bytes.load(Ordering::Relaxed), 100);
        assert_eq!(counters.total.load(Ordering::Relaxed), 2);
    }
}
