#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    /// 모든 업스트림이 금지/비활성/일시 제외 상태
    #[error("서비스 {service}에 사용 가능한 업스트림이 없음")]
    NoAvailableUpstream { service: String },
}
