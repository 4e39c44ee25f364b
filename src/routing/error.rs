use std::fmt;

/// 라우팅 관련 에러를 표현하는 열거형입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// 유효하지 않은 호스트 이름
    InvalidHost {
        host: String,
        reason: String,
    },
    /// 유효하지 않은 포트 번호
    InvalidPort {
        port: String,
        reason: String,
    },
    /// Host 헤더 누락
    MissingHost,
    /// 헤더 파싱 에러
    HeaderParseError {
        header_name: String,
        error: String,
    },
    /// 요청을 처리할 서비스가 없음
    NoMatchingService {
        target: String,
    },
    /// 레지스트리가 아직 로드되지 않음
    NotLoaded,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::InvalidHost { host, reason } =>
                write!(f, "유효하지 않은 호스트 {}: {}", host, reason),
            RoutingError::InvalidPort { port, reason } =>
                write!(f, "유효하지 않은 포트 {}: {}", port, reason),
            RoutingError::MissingHost =>
                write!(f, "Host 헤더가 누락됨"),
            RoutingError::HeaderParseError { header_name, error } =>
                write!(f, "{} 헤더 파싱 실패: {}", header_name, error),
            RoutingError::NoMatchingService { target } =>
                write!(f, "{}에 매칭되는 서비스 없음", target),
            RoutingError::NotLoaded =>
                write!(f, "서비스 레지스트리가 로드되지 않음"),
        }
    }
}

impl std::error::Error for RoutingError {}
