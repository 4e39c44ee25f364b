use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::access::{AccessController, FailurePolicy, FlowCounter};
use crate::balancer::BalancerOptions;

use super::SettingsError;

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

// 포트 파싱 전용 함수
fn parse_port_var(name: &str, default: u16) -> Result<u16, SettingsError> {
    let port = parse_env_var::<u16, _>(name, || default)?;
    if port == 0 {
        return Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "0".to_string(),
            reason: "포트는 0이 될 수 없습니다".to_string(),
        });
    }
    Ok(port)
}

fn invalid(field: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn default_services_file() -> PathBuf { PathBuf::from("services.json") }
fn default_page_size() -> u32 { 100 }
fn default_watch() -> bool { true }

/// 서비스 정의 저장소 설정
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrySettings {
    /// 서비스 정의 JSON 파일 경로
    #[serde(default = "default_services_file")]
    pub services_file: PathBuf,

    /// 서비스 목록 조회 페이지 크기 (기본값: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// 파일 변경 시 자동 재로드 여부
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl RegistrySettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let settings = Self {
            services_file: env::var("GATEWAY_SERVICES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_services_file()),
            page_size: parse_env_var("GATEWAY_PAGE_SIZE", default_page_size)?,
            watch: parse_env_var("GATEWAY_WATCH", default_watch)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.services_file.as_os_str().is_empty() {
            return Err(invalid("registry.services_file", "경로가 비어 있습니다"));
        }
        if self.page_size == 0 {
            return Err(invalid("registry.page_size", "페이지 크기는 1 이상이어야 합니다"));
        }
        Ok(())
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            services_file: default_services_file(),
            page_size: default_page_size(),
            watch: default_watch(),
        }
    }
}

fn default_cluster_ip() -> String { "127.0.0.1".to_string() }
fn default_cluster_port() -> u16 { 8080 }
fn default_cluster_ssl_port() -> u16 { 4433 }

/// 서비스 접근 주소 표시에 쓰이는 클러스터 공개 주소
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClusterSettings {
    #[serde(default = "default_cluster_ip")]
    pub ip: String,
    #[serde(default = "default_cluster_port")]
    pub port: u16,
    #[serde(default = "default_cluster_ssl_port")]
    pub ssl_port: u16,
}

impl ClusterSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let settings = Self {
            ip: env::var("GATEWAY_CLUSTER_IP").unwrap_or_else(|_| default_cluster_ip()),
            port: parse_port_var("GATEWAY_CLUSTER_PORT", default_cluster_port())?,
            ssl_port: parse_port_var("GATEWAY_CLUSTER_SSL_PORT", default_cluster_ssl_port())?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ip.trim().is_empty() {
            return Err(invalid("cluster.ip", "주소가 비어 있습니다"));
        }
        if self.port == 0 || self.ssl_port == 0 {
            return Err(invalid("cluster.port", "포트는 0이 될 수 없습니다"));
        }
        if self.port == self.ssl_port {
            return Err(invalid("cluster.ssl_port", "HTTP와 HTTPS 포트는 달라야 합니다"));
        }
        Ok(())
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            ip: default_cluster_ip(),
            port: default_cluster_port(),
            ssl_port: default_cluster_ssl_port(),
        }
    }
}

fn default_max_fails() -> u32 { 3 }
fn default_fail_timeout_secs() -> u64 { 10 }

#[derive(Clone, Debug, Deserialize)]
pub struct BalancerSettings {
    /// 업스트림을 일시 제외하기까지의 연속 실패 횟수 (0 = 비활성)
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
    #[serde(default = "default_fail_timeout_secs")]
    pub fail_timeout_secs: u64,
}

impl BalancerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            max_fails: parse_env_var("GATEWAY_MAX_FAILS", default_max_fails)?,
            fail_timeout_secs: parse_env_var("GATEWAY_FAIL_TIMEOUT", default_fail_timeout_secs)?,
        })
    }

    pub fn options(&self) -> BalancerOptions {
        BalancerOptions {
            max_fails: self.max_fails,
            fail_timeout: Duration::from_secs(self.fail_timeout_secs),
        }
    }
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            max_fails: default_max_fails(),
            fail_timeout_secs: default_fail_timeout_secs(),
        }
    }
}

fn default_counter_timeout_ms() -> u64 { 50 }
fn default_flow_window_ms() -> u64 { 1000 }
fn default_flow_idle_secs() -> u64 { 300 }

#[derive(Clone, Debug, Deserialize)]
pub struct AccessSettings {
    /// 유량 카운터 조회 제한 시간
    #[serde(default = "default_counter_timeout_ms")]
    pub counter_timeout_ms: u64,

    /// 조회 실패/시간 초과 시 처리 (기본값: closed)
    #[serde(default)]
    pub counter_failure: FailurePolicy,

    /// 메모리 유량 카운터의 윈도 크기
    #[serde(default = "default_flow_window_ms")]
    pub flow_window_ms: u64,

    /// 이 시간 동안 요청이 없던 클라이언트 유량 키를 정리
    #[serde(default = "default_flow_idle_secs")]
    pub flow_idle_secs: u64,

    /// X-Forwarded-For / X-Real-IP 신뢰 여부
    #[serde(default)]
    pub trust_forwarded: bool,
}

impl AccessSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let settings = Self {
            counter_timeout_ms: parse_env_var("GATEWAY_COUNTER_TIMEOUT_MS", default_counter_timeout_ms)?,
            counter_failure: parse_env_var("GATEWAY_COUNTER_FAILURE", FailurePolicy::default)?,
            flow_window_ms: parse_env_var("GATEWAY_FLOW_WINDOW_MS", default_flow_window_ms)?,
            flow_idle_secs: parse_env_var("GATEWAY_FLOW_IDLE_SECS", default_flow_idle_secs)?,
            trust_forwarded: parse_env_var("GATEWAY_TRUST_FORWARDED", || false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.counter_timeout_ms == 0 {
            return Err(invalid("access.counter_timeout_ms", "0보다 커야 합니다"));
        }
        if self.flow_window_ms == 0 {
            return Err(invalid("access.flow_window_ms", "0보다 커야 합니다"));
        }
        if self.flow_idle_secs.saturating_mul(1000) < self.flow_window_ms {
            return Err(invalid("access.flow_idle_secs", "유량 윈도보다 짧을 수 없습니다"));
        }
        Ok(())
    }

    pub fn flow_window(&self) -> Duration {
        Duration::from_millis(self.flow_window_ms)
    }

    pub fn flow_idle(&self) -> Duration {
        Duration::from_secs(self.flow_idle_secs)
    }

    pub fn controller(&self, counter: Arc<dyn FlowCounter>) -> AccessController {
        AccessController::new(counter)
            .with_timeout(Duration::from_millis(self.counter_timeout_ms))
            .with_failure_policy(self.counter_failure)
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            counter_timeout_ms: default_counter_timeout_ms(),
            counter_failure: FailurePolicy::default(),
            flow_window_ms: default_flow_window_ms(),
            flow_idle_secs: default_flow_idle_secs(),
            trust_forwarded: false,
        }
    }
}
