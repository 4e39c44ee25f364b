use std::fmt;
use std::net::IpAddr;

/// 접근 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    Blacklisted,
    NotWhitelisted,
    ServiceRateLimited,
    ClientRateLimited,
    /// 유량 카운터 조회 실패 (fail-closed 정책)
    CounterUnavailable,
}

impl DenyReason {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, DenyReason::ServiceRateLimited | DenyReason::ClientRateLimited)
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenyReason::Blacklisted => "블랙리스트에 등록된 클라이언트",
            DenyReason::NotWhitelisted => "화이트리스트에 없는 클라이언트",
            DenyReason::ServiceRateLimited => "서비스 QPS 제한 초과",
            DenyReason::ClientRateLimited => "클라이언트 QPS 제한 초과",
            DenyReason::CounterUnavailable => "유량 카운터 사용 불가",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("서비스 {service} 접근 거부 (client={client_ip}): {reason}")]
pub struct AccessDenied {
    pub service: String,
    pub client_ip: IpAddr,
    pub reason: DenyReason,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("유량 카운터 조회 실패 ({key}): {message}")]
    Unavailable { key: String, message: String },

    #[error("유량 카운터 응답 시간 초과 ({key})")]
    Timeout { key: String },
}
