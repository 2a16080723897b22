//! Driver Error Types
//!
//! 드라이버 에러 정의. Connector 경계 밖으로는 항상 이 분류 중 하나만
//! 전달되며, 전송 계층 에러([`BoltError`])는 여기서 변환됩니다.

use std::fmt;

use thiserror::Error;

use crate::bolt::message::FailureMetadata;
use crate::bolt::{BoltError, PackStreamError};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 세션을 열거나 얻을 수 없음 (다이얼, 핸드셰이크 실패, 풀 종료)
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// 정상이던 세션이 작업 도중 끊어짐
    #[error("Connection broken: {0}")]
    ConnectionBroken(String),

    /// 풀이 설정된 용량에 도달함
    #[error("Connection limit: {0}")]
    ConnectionLimit(String),

    /// 잘못된 바이트 또는 예상하지 못한 메시지
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 서버가 보고한 실패
    #[error(transparent)]
    Server(#[from] Neo4jError),

    /// 사용할 수 있는 서버가 없음
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 쓰기 서버를 사용할 수 없음
    #[error("Write service unavailable: {0}")]
    WriteServiceUnavailable(String),

    /// 라우팅을 지원하지 않는 서버
    #[error("Routing not supported: {0}")]
    RoutingNotSupported(String),

    /// 협상된 프로토콜 버전에서 지원하지 않는 기능
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// 현재 상태에서 허용되지 않는 작업
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 이미 모두 소비된 결과
    #[error("Result consumed: {0}")]
    ResultConsumed(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 구조체 하이드레이션 에러
    #[error("Hydration error: {0}")]
    Hydration(String),
}

impl DriverError {
    /// 연결 불가 에러 생성
    pub fn connection_unavailable(msg: impl Into<String>) -> Self {
        Self::ConnectionUnavailable(msg.into())
    }

    /// 연결 끊김 에러 생성
    pub fn connection_broken(msg: impl Into<String>) -> Self {
        Self::ConnectionBroken(msg.into())
    }

    /// 용량 초과 에러 생성
    pub fn connection_limit(msg: impl Into<String>) -> Self {
        Self::ConnectionLimit(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 미지원 기능 에러 생성
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// 상태 에러 생성
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 하이드레이션 에러 생성
    pub fn hydration(msg: impl Into<String>) -> Self {
        Self::Hydration(msg.into())
    }

    /// 연결 계층 실패 여부. Connector는 이 경우 해당 풀을 정리합니다.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable(_) | Self::ConnectionBroken(_) | Self::ConnectionLimit(_)
        )
    }

    /// 재시도 가능 여부
    ///
    /// 연결 계층 실패, Transient 서버 에러, NotALeader 에러가 해당됩니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server(e) => e.should_retry(),
            other => other.is_connection_failure(),
        }
    }

    /// 서버 에러 참조
    pub fn as_server_error(&self) -> Option<&Neo4jError> {
        match self {
            Self::Server(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Io(_) | BoltError::ConnectionClosed => {
                DriverError::ConnectionBroken(err.to_string())
            }
            BoltError::WireClosed | BoltError::Handshake(_) => {
                DriverError::ConnectionUnavailable(err.to_string())
            }
            BoltError::PackStream(_) | BoltError::Protocol(_) | BoltError::MessageTooLarge { .. } => {
                DriverError::Protocol(err.to_string())
            }
        }
    }
}

impl From<PackStreamError> for DriverError {
    fn from(err: PackStreamError) -> Self {
        DriverError::Protocol(err.to_string())
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Neo4jError - 서버 에러
// ============================================================================

/// 상태 코드의 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// `ClientError`
    Client,
    /// `DatabaseError`
    Database,
    /// `TransientError`
    Transient,
    /// 형식이 맞지 않거나 알 수 없는 분류
    Unknown,
}

impl Classification {
    fn parse(s: &str) -> Self {
        match s {
            "ClientError" => Self::Client,
            "DatabaseError" => Self::Database,
            "TransientError" => Self::Transient,
            _ => Self::Unknown,
        }
    }
}

/// 서버 에러
///
/// 상태 코드는 `Neo.{Classification}.{Category}.{Title}` 형식을 따릅니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neo4jError {
    /// 전체 상태 코드
    pub code: String,
    /// 에러 메시지
    pub message: String,
    /// 분류
    pub classification: Classification,
    /// 카테고리 (예: `Cluster`, `Statement`)
    pub category: String,
    /// 제목 (예: `NotALeader`)
    pub title: String,
}

impl Neo4jError {
    /// 상태 코드와 메시지로 생성
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let parts: Vec<&str> = code.split('.').collect();
        let (classification, category, title) = match parts.as_slice() {
            ["Neo", classification, category, title] => (
                Classification::parse(classification),
                category.to_string(),
                title.to_string(),
            ),
            _ => (Classification::Unknown, String::new(), String::new()),
        };
        Self {
            message: message.into(),
            classification,
            category,
            title,
            code,
        }
    }

    /// 재시도 대상 여부
    pub fn should_retry(&self) -> bool {
        match self.classification {
            Classification::Transient => true,
            Classification::Client => self.is_not_a_leader(),
            _ => false,
        }
    }

    /// 라우팅 테이블 무효화 필요 여부
    pub fn should_invalidate_routing_table(&self) -> bool {
        self.classification == Classification::Client && self.is_not_a_leader()
    }

    fn is_not_a_leader(&self) -> bool {
        self.category == "Cluster" && self.title == "NotALeader"
    }
}

impl From<FailureMetadata> for Neo4jError {
    fn from(failure: FailureMetadata) -> Self {
        Self::new(failure.code, failure.message)
    }
}

impl fmt::Display for Neo4jError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}.{}] {}", self.category, self.title, self.message)
    }
}

impl std::error::Error for Neo4jError {}

// ============================================================================
// Tests
// ============================================================================
