use std::fmt;
use std::path::PathBuf;

/// 게이트웨이 설정 로드/검증 에러
#[derive(Debug)]
pub enum SettingsError {
    /// `GATEWAY_*` 환경 변수 값을 해석할 수 없음
    EnvVarInvalid {
        var_name: String,
        value: String,
        reason: String,
    },
    /// 설정 파일을 읽을 수 없음
    FileError {
        path: PathBuf,
        error: std::io::Error,
    },
    ParseError {
        source: toml::de::Error,
    },
    /// 개별 값은 맞지만 범위나 조합이 잘못된 설정
    InvalidConfig {
        field: String,
        reason: String,
    },
    /// 서비스 정의 파일 감시 시작 실패
    WatchError(String),
}

impl SettingsError {
    /// 문제가 된 설정 항목 이름 (환경 변수 이름 또는 `section.field`)
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::EnvVarInvalid { var_name, .. } => Some(var_name),
            Self::InvalidConfig { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarInvalid { var_name, value, reason } =>
                write!(f, "환경 변수 {}='{}' 해석 실패: {}", var_name, value, reason),
            Self::FileError { path, error } =>
                write!(f, "게이트웨이 설정 파일 {} 읽기 실패: {}", path.display(), error),
            Self::ParseError { source } =>
                write!(f, "게이트웨이 설정 TOML 파싱 실패: {}", source),
            Self::InvalidConfig { field, reason } =>
                write!(f, "잘못된 설정 {}: {}", field, reason),
            Self::WatchError(message) =>
                write!(f, "서비스 정의 파일 감시 실패: {}", message),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError { source } => Some(source),
            Self::FileError { error, .. } => Some(error),
            _ => None,
        }
    }
}
