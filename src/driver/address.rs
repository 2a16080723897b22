//! 서버 주소
//!
//! 풀과 라우팅 테이블의 키로 쓰이는 불변 주소 타입.

use std::fmt;
use std::str::FromStr;

use super::error::{DriverError, DriverResult};

/// 기본 호스트
pub const DEFAULT_HOST: &str = "localhost";

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// Address - 서버 주소
// ============================================================================

/// 서버 주소
///
/// IPv4 형식은 `(host, port)`, IPv6 형식은 여기에 0으로 고정된
/// flow info 와 scope id 가 더해집니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// `host:port`
    V4 { host: String, port: u16 },
    /// `[host]:port`
    V6 {
        host: String,
        port: u16,
        flow_info: u32,
        scope_id: u32,
    },
}

impl Address {
    /// IPv4 형식 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::V4 {
            host: host.into(),
            port,
        }
    }

    /// IPv6 형식 주소 생성
    pub fn v6(host: impl Into<String>, port: u16) -> Self {
        Self::V6 {
            host: host.into(),
            port,
            flow_info: 0,
            scope_id: 0,
        }
    }

    /// 문자열 파싱
    ///
    /// `[host]:port` 는 IPv6, `host:port` 는 IPv4 형식이 됩니다. 괄호 없이
    /// 콜론이 둘 이상이면 포트 없는 IPv6 호스트로 봅니다. 비어 있는
    /// 호스트나 포트는 기본값으로 채웁니다.
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Invalid address '{}'", s)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => {
                    return Err(DriverError::configuration(format!("Invalid address '{}'", s)))
                }
            };
            return Ok(Self::v6(or_default_host(host), port));
        }

        if s.matches(':').count() > 1 {
            return Ok(Self::v6(s, DEFAULT_PORT));
        }

        match s.split_once(':') {
            Some((host, port)) => Ok(Self::new(or_default_host(host), parse_port(port)?)),
            None => Ok(Self::new(or_default_host(s), DEFAULT_PORT)),
        }
    }

    /// 호스트
    pub fn host(&self) -> &str {
        match self {
            Self::V4 { host, .. } | Self::V6 { host, .. } => host,
        }
    }

    /// 포트
    pub fn port(&self) -> u16 {
        match self {
            Self::V4 { port, .. } | Self::V6 { port, .. } => *port,
        }
    }

    /// IPv6 형식 여부
    pub fn is_v6(&self) -> bool {
        matches!(self, Self::V6 { .. })
    }

    /// `TcpStream::connect` 에 넘길 수 있는 형태
    pub fn to_socket_addr(&self) -> String {
        self.to_string()
    }
}

fn or_default_host(host: &str) -> &str {
    if host.is_empty() {
        DEFAULT_HOST
    } else {
        host
    }
}

fn parse_port(port: &str) -> DriverResult<u16> {
    if port.is_empty() {
        return Ok(DEFAULT_PORT);
    }
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port '{}'", port)))
}

impl Default for Address {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl FromStr for Address {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 { host, port } => write!(f, "{}:{}", host, port),
            Self::V6 { host, port, .. } => write!(f, "[{}]:{}", host, port),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
