use std::{env, path::Path};
use serde::Deserialize;
use tracing::debug;

use crate::registry::RegistryOptions;

mod error;
mod gateway;
pub mod logging;
mod watcher;

pub use error::SettingsError;
pub use gateway::{
    parse_env_var, AccessSettings, BalancerSettings, ClusterSettings, RegistrySettings,
};
pub use logging::LogSettings;
pub use watcher::{ConfigEvent, ConfigWatcher};

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    // 서비스 정의 저장소
    #[serde(default)]
    pub registry: RegistrySettings,

    // 클러스터 공개 주소
    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub balancer: BalancerSettings,

    // 접근 제어
    #[serde(default)]
    pub access: AccessSettings,

    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,
}

impl Settings {
    /// `GATEWAY_CONFIG_FILE`이 있으면 TOML 파일에서, 없으면 환경 변수에서 읽습니다.
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var("GATEWAY_CONFIG_FILE") {
            Self::from_toml_file(&config_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_path_buf(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError { source: e })?;

        debug!(path = %path.as_ref().display(), "설정 파일 로드");
        settings.validate()?;
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let settings = Self {
            registry: RegistrySettings::from_env()?,
            cluster: ClusterSettings::from_env()?,
            balancer: BalancerSettings::from_env()?,
            access: AccessSettings::from_env()?,
            logging: LogSettings::from_env()?,
        };

        // 설정 생성 시점에 바로 검증
        settings.validate()?;
        Ok(settings)
    }

    /// 설정 유효성 검증
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.cluster.validate()?;
        self.access.validate()?;
        Ok(())
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            page_size: self.registry.page_size,
            balancer: self.balancer.options(),
        }
    }
}
