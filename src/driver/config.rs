//! 드라이버 설정
//!
//! 환경 변수는 읽지 않습니다. 호출자가 [`DriverConfig`] 를 직접 만들어
//! Connector 에 넘깁니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bolt::handshake::{VersionProposal, DEFAULT_PROPOSALS, MAX_PROPOSALS};
use crate::bolt::codec::DEFAULT_MAX_MESSAGE_SIZE;

pub use crate::bolt::message::AuthToken;

use super::address::Address;
use super::error::{DriverError, DriverResult};
use super::hydration::Hydrator;

/// 서버 에이전트 기본 접두사 (Bolt 1/2 에서 검사)
pub const DEFAULT_SERVER_AGENT_PREFIX: &str = "Neo4j/";

/// 기본 User Agent
pub fn default_user_agent() -> String {
    format!("graphbolt/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `init_size` | 0 |
/// | `max_size` | 제한 없음 |
/// | `max_age` | 3600초 |
/// | `connection_timeout` | 30초 |
/// | `max_retry_time` | 30초 |
/// | `protocol_versions` | 4.3~4.0, 4.0, 3.0, 2.0 |
/// | `max_message_size` | 16 MiB |
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 초기 서버 주소 (라우팅 모드에서는 초기 라우터)
    pub address: Address,
    /// 라우팅 모드 (`neo4j://` 스킴)
    pub routing: bool,
    /// TLS 요청 여부 (`+s`, `+ssc` 스킴). 실제 암호화는 Dialer 가 담당
    pub secure: bool,
    /// 인증 토큰
    pub auth: AuthToken,
    /// User Agent
    pub user_agent: String,
    /// 풀 생성 시 미리 여는 연결 수
    pub init_size: usize,
    /// 풀당 최대 연결 수 (`None` 이면 제한 없음)
    pub max_size: Option<usize>,
    /// 연결 최대 수명
    pub max_age: Duration,
    /// 다이얼 타임아웃
    pub connection_timeout: Duration,
    /// 서버가 알려준 TTL 대신 사용할 라우팅 테이블 수명
    pub routing_refresh_ttl: Option<Duration>,
    /// 라우팅 요청에 실어 보내는 컨텍스트
    pub routing_context: BTreeMap<String, String>,
    /// 핸드셰이크 제안 목록 (최대 4개, 높은 버전부터)
    pub protocol_versions: Vec<VersionProposal>,
    /// 수신 메시지 최대 크기
    pub max_message_size: usize,
    /// `query`/`update` 재시도 시간 예산
    pub max_retry_time: Duration,
    /// Bolt 1/2 서버 에이전트가 가져야 할 접두사
    pub server_agent_prefix: String,
    /// 구조체 하이드레이션 테이블
    pub hydrator: Arc<Hydrator>,
}

impl DriverConfig {
    /// URI 로 설정 생성
    ///
    /// 지원 스킴: `bolt`, `bolt+s`, `bolt+ssc`, `neo4j`, `neo4j+s`, `neo4j+ssc`.
    /// 스킴이 없으면 `bolt` 로 봅니다. `neo4j` 스킴의 쿼리 문자열은
    /// 라우팅 컨텍스트가 됩니다.
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let (scheme, rest) = match uri.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("bolt", uri),
        };
        let (routing, secure) = match scheme {
            "bolt" => (false, false),
            "bolt+s" | "bolt+ssc" => (false, true),
            "neo4j" => (true, false),
            "neo4j+s" | "neo4j+ssc" => (true, true),
            other => {
                return Err(DriverError::configuration(format!(
                    "Unsupported URI scheme '{}'",
                    other
                )))
            }
        };

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        let authority = authority.trim_end_matches('/');
        let address = Address::parse(authority)?;

        let mut routing_context = BTreeMap::new();
        if let Some(query) = query {
            if !routing {
                return Err(DriverError::configuration(
                    "Routing context is only valid for neo4j:// URIs",
                ));
            }
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    DriverError::configuration(format!("Invalid routing context entry '{}'", pair))
                })?;
                routing_context.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self {
            address,
            routing,
            secure,
            auth,
            routing_context,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 설정 검증
    pub fn validate(&self) -> DriverResult<()> {
        if self.protocol_versions.is_empty() || self.protocol_versions.len() > MAX_PROPOSALS {
            return Err(DriverError::configuration(format!(
                "Between 1 and {} protocol versions must be proposed",
                MAX_PROPOSALS
            )));
        }
        if self.max_message_size == 0 {
            return Err(DriverError::configuration("max_message_size must be positive"));
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: Address::default(),
            routing: false,
            secure: false,
            auth: AuthToken::none(),
            user_agent: default_user_agent(),
            init_size: 0,
            max_size: None,
            max_age: Duration::from_secs(3600),
            connection_timeout: Duration::from_secs(30),
            routing_refresh_ttl: None,
            routing_context: BTreeMap::new(),
            protocol_versions: DEFAULT_PROPOSALS.to_vec(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_retry_time: Duration::from_secs(30),
            server_agent_prefix: DEFAULT_SERVER_AGENT_PREFIX.to_string(),
            hydrator: Arc::new(Hydrator::default()),
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// 라우팅 모드 설정
    pub fn with_routing(mut self, routing: bool) -> Self {
        self.config.routing = routing;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 초기 연결 수 설정
    pub fn with_init_size(mut self, size: usize) -> Self {
        self.config.init_size = size;
        self
    }

    /// 풀 최대 크기 설정
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.config.max_size = Some(size);
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.config.max_age = age;
        self
    }

    /// 다이얼 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 라우팅 테이블 TTL 고정
    pub fn with_routing_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.config.routing_refresh_ttl = Some(ttl);
        self
    }

    /// 라우팅 컨텍스트 항목 추가
    pub fn with_routing_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.routing_context.insert(key.into(), value.into());
        self
    }

    /// 핸드셰이크 제안 목록 설정
    pub fn with_protocol_versions(mut self, versions: Vec<VersionProposal>) -> Self {
        self.config.protocol_versions = versions;
        self
    }

    /// 수신 메시지 최대 크기 설정
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// 재시도 시간 예산 설정
    pub fn with_max_retry_time(mut self, time: Duration) -> Self {
        self.config.max_retry_time = time;
        self
    }

    /// 서버 에이전트 접두사 설정
    pub fn with_server_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.server_agent_prefix = prefix.into();
        self
    }

    /// 하이드레이션 테이블 설정
    pub fn with_hydrator(mut self, hydrator: Hydrator) -> Self {
        self.config.hydrator = Arc::new(hydrator);
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Tests
// ============================================================================
