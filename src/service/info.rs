use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// 서비스가 처리하는 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Tcp,
    Grpc,
}

impl Protocol {
    /// 기존 관리 DB의 숫자 코드(0=http, 1=tcp, 2=grpc)를 변환합니다.
    pub fn from_load_type(load_type: i64) -> Result<Self, ConfigError> {
        match load_type {
            0 => Ok(Protocol::Http),
            1 => Ok(Protocol::Tcp),
            2 => Ok(Protocol::Grpc),
            other => Err(ConfigError::new(
                "load_type",
                format!("알 수 없는 프로토콜 코드: {}", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "tcp" => Ok(Protocol::Tcp),
            "grpc" => Ok(Protocol::Grpc),
            _ => Err(ConfigError::new(
                "protocol",
                format!("지원하지 않는 프로토콜: {}", s),
            )),
        }
    }
}

/// 서비스 식별 정보와 프로토콜 선택자입니다.
///
/// 서비스는 물리적으로 삭제되지 않고 `deleted` 플래그로만 표시됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub protocol: Protocol,
    pub deleted: bool,
}

impl ServiceInfo {
    pub fn new(id: i64, name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            protocol,
            deleted: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("name", "서비스 이름이 비어 있습니다"));
        }
        Ok(())
    }
}
