/// 잘못되었거나 내부적으로 모순된 설정을 표현합니다.
///
/// 관리자 경로로 그대로 전달되며, 자동으로 보정되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("설정 오류 ({field}): {reason}")]
pub struct ConfigError {
    /// 문제가 된 필드 이름
    pub field: String,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
