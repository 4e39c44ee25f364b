//! JSON 파일 기반 서비스 저장소
//!
//! 관리 DB의 행 구조를 그대로 옮긴 JSON 문서를 읽어 타입이 있는 설정으로
//! 변환합니다. 문서는 스키마 검증을 통과해야 사용됩니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::service::{
    parse_listen_port, AccessControlConfig, BalancePolicy, ConfigError, GrpcRule, HeaderTransform,
    HttpMatchKind, HttpRule, LoadBalanceConfig, Protocol, Rule, ServiceInfo, TcpRule, UrlRewrite,
};

use super::store::{ServiceStore, StoreError};

/// 서비스 정의 문서 스키마 (JSON Schema Draft 7)
pub const SERVICES_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "required": ["version", "services"],
    "properties": {
        "version": {
            "type": "string",
            "enum": ["1.0"]
        },
        "services": {
            "type": "array",
            "items": {
                "type": "object",
                "required": ["id", "name", "load_type"],
                "properties": {
                    "id": {"type": "integer", "minimum": 1},
                    "name": {"type": "string", "minLength": 1},
                    "description": {"type": "string"},
                    "load_type": {
                        "oneOf": [
                            {"type": "integer", "minimum": 0, "maximum": 2},
                            {"type": "string", "enum": ["http", "tcp", "grpc"]}
                        ]
                    },
                    "deleted": {"type": "boolean"},
                    "http_rule": {
                        "type": "object",
                        "required": ["rule_type", "rule"],
                        "properties": {
                            "rule_type": {
                                "oneOf": [
                                    {"type": "integer", "minimum": 0, "maximum": 1},
                                    {"type": "string", "enum": ["domain", "prefix", "prefix_url"]}
                                ]
                            },
                            "rule": {"type": "string"},
                            "need_https": {"type": "boolean"},
                            "need_strip_uri": {"type": "boolean"},
                            "need_websocket": {"type": "boolean"},
                            "url_rewrite": {"type": "string"},
                            "header_transfor": {"type": "string"}
                        }
                    },
                    "tcp_rule": {
                        "type": "object",
                        "required": ["port"],
                        "properties": {
                            "port": {"type": "integer"}
                        }
                    },
                    "grpc_rule": {
                        "type": "object",
                        "required": ["port"],
                        "properties": {
                            "port": {"type": "integer"},
                            "header_transfor": {"type": "string"}
                        }
                    },
                    "load_balance": {
                        "type": "object",
                        "required": ["ip_list", "weight_list"],
                        "properties": {
                            "round_type": {
                                "oneOf": [
                                    {"type": "integer", "minimum": 0, "maximum": 3},
                                    {"type": "string"}
                                ]
                            },
                            "ip_list": {"type": "string"},
                            "weight_list": {"type": "string"},
                            "forbid_list": {"type": "string"},
                            "upstream_connect_timeout": {"type": "integer", "minimum": 0},
                            "upstream_header_timeout": {"type": "integer", "minimum": 0},
                            "upstream_idle_timeout": {"type": "integer", "minimum": 0},
                            "upstream_max_idle": {"type": "integer", "minimum": 0}
                        }
                    },
                    "access_control": {
                        "type": "object",
                        "properties": {
                            "open_auth": {"type": "boolean"},
                            "black_list": {"type": "string"},
                            "white_list": {"type": "string"},
                            "clientip_flow_limit": {"type": "integer", "minimum": 0},
                            "service_flow_limit": {"type": "integer", "minimum": 0}
                        }
                    }
                }
            }
        }
    }
}"#;

/// 숫자 코드 또는 이름으로 표현된 열거 값
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Code {
    Number(i64),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct ServiceDocument {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceRecord {
    id: i64,
    name: String,
    #[serde(default)]
    description: String,
    load_type: Code,
    #[serde(default)]
    deleted: bool,
    http_rule: Option<HttpRuleRecord>,
    tcp_rule: Option<PortRuleRecord>,
    grpc_rule: Option<PortRuleRecord>,
    load_balance: Option<LoadBalanceRecord>,
    access_control: Option<AccessControlRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpRuleRecord {
    rule_type: Code,
    rule: String,
    #[serde(default)]
    need_https: bool,
    #[serde(default)]
    need_strip_uri: bool,
    #[serde(default)]
    need_websocket: bool,
    #[serde(default)]
    url_rewrite: String,
    #[serde(default)]
    header_transfor: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PortRuleRecord {
    port: i64,
    #[serde(default)]
    header_transfor: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LoadBalanceRecord {
    round_type: Option<Code>,
    ip_list: String,
    weight_list: String,
    #[serde(default)]
    forbid_list: String,
    #[serde(default)]
    upstream_connect_timeout: u64,
    #[serde(default)]
    upstream_header_timeout: u64,
    #[serde(default)]
    upstream_idle_timeout: u64,
    #[serde(default)]
    upstream_max_idle: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AccessControlRecord {
    open_auth: bool,
    black_list: String,
    white_list: String,
    clientip_flow_limit: u64,
    service_flow_limit: u64,
}

impl ServiceRecord {
    fn info(&self) -> Result<ServiceInfo, ConfigError> {
        let protocol = match &self.load_type {
            Code::Number(code) => Protocol::from_load_type(*code)?,
            Code::Name(name) => name.parse()?,
        };

        let mut info = ServiceInfo::new(self.id, self.name.clone(), protocol)
            .with_description(self.description.clone());
        info.deleted = self.deleted;
        Ok(info)
    }
}

impl HttpRuleRecord {
    fn to_rule(&self, service_id: i64) -> Result<HttpRule, ConfigError> {
        let match_kind = match &self.rule_type {
            Code::Number(code) => HttpMatchKind::from_rule_type(*code)?,
            Code::Name(name) => name.parse()?,
        };

        let mut rule = HttpRule::new(service_id, match_kind, self.rule.trim());
        rule.require_tls = self.need_https;
        rule.strip_prefix = self.need_strip_uri;
        rule.enable_websocket = self.need_websocket;
        rule.rewrite_rules = UrlRewrite::parse_list(&self.url_rewrite)?;
        rule.header_transforms = HeaderTransform::parse_list(&self.header_transfor)?;
        Ok(rule)
    }
}

impl LoadBalanceRecord {
    fn to_config(&self, service_id: i64) -> Result<LoadBalanceConfig, ConfigError> {
        let policy = match &self.round_type {
            None => BalancePolicy::default(),
            Some(Code::Number(code)) => BalancePolicy::from_round_type(*code)?,
            Some(Code::Name(name)) => name.parse()?,
        };

        Ok(
            LoadBalanceConfig::parse(service_id, policy, &self.ip_list, &self.weight_list)?
                .with_forbidden_list(&self.forbid_list)
                .with_timeouts(
                    Duration::from_secs(self.upstream_connect_timeout),
                    Duration::from_secs(self.upstream_header_timeout),
                    Duration::from_secs(self.upstream_idle_timeout),
                )
                .with_max_idle(self.upstream_max_idle),
        )
    }
}

impl AccessControlRecord {
    fn to_config(&self, service_id: i64) -> Result<AccessControlConfig, ConfigError> {
        Ok(AccessControlConfig {
            service_id,
            auth_enabled: self.open_auth,
            black_list: AccessControlConfig::parse_ip_list("black_list", &self.black_list)?,
            white_list: AccessControlConfig::parse_ip_list("white_list", &self.white_list)?,
            client_qps_limit: self.clientip_flow_limit,
            service_qps_limit: self.service_flow_limit,
        })
    }
}

/// 한 번 읽어들인 문서
#[derive(Debug, Default)]
struct LoadedDocument {
    /// 삭제되지 않은 서비스 id, 내림차순
    active: Vec<i64>,
    records: HashMap<i64, ServiceRecord>,
}

/// JSON 파일에서 서비스 설정을 읽는 `ServiceStore` 구현
///
/// 첫 페이지 요청 때마다 파일을 다시 읽으므로, 한 번의 로드는 하나의 일관된
/// 문서만 보게 됩니다.
pub struct JsonServiceStore {
    path: PathBuf,
    schema: JSONSchema,
    document: RwLock<Arc<LoadedDocument>>,
}

impl JsonServiceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let schema_value: Value = serde_json::from_str(SERVICES_SCHEMA)
            .map_err(|e| StoreError::Parse(format!("스키마 파싱 오류: {}", e)))?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| StoreError::Schema {
                errors: vec![format!("스키마 컴파일 오류: {}", e)],
            })?;

        debug!("서비스 정의 스키마 컴파일 성공");
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            schema,
            document: RwLock::new(Arc::new(LoadedDocument::default())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn refresh(&self) -> Result<Arc<LoadedDocument>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.display().to_string(),
                source: e,
            })?;

        let document = Arc::new(self.parse(&content)?);
        *self.document.write().await = document.clone();
        debug!(
            path = %self.path.display(),
            services = document.active.len(),
            "서비스 정의 파일 로드"
        );
        Ok(document)
    }

    fn parse(&self, content: &str) -> Result<LoadedDocument, StoreError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;

        if let Err(errors) = self.schema.validate(&value) {
            let errors: Vec<String> = errors
                .map(|error| format!("{} (경로: {})", error, error.instance_path))
                .collect();
            error!(path = %self.path.display(), errors = ?errors, "스키마 검증 실패");
            return Err(StoreError::Schema { errors });
        }

        let document: ServiceDocument =
            serde_json::from_value(value).map_err(|e| StoreError::Parse(e.to_string()))?;

        let mut records = HashMap::with_capacity(document.services.len());
        for record in document.services {
            let id = record.id;
            if records.insert(id, record).is_some() {
                return Err(ConfigError::new("id", format!("서비스 id {}가 중복됨", id)).into());
            }
        }

        let mut active: Vec<i64> = records
            .values()
            .filter(|record| !record.deleted)
            .map(|record| record.id)
            .collect();
        active.sort_unstable_by(|a, b| b.cmp(a));

        Ok(LoadedDocument { active, records })
    }

    async fn record(&self, service_id: i64) -> Result<ServiceRecord, StoreError> {
        let document = self.document.read().await.clone();
        document
            .records
            .get(&service_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "service",
                service_id,
            })
    }
}

#[async_trait]
impl ServiceStore for JsonServiceStore {
    async fn list_active_services(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ServiceInfo>, StoreError> {
        let document = if page <= 1 {
            self.refresh().await?
        } else {
            self.document.read().await.clone()
        };

        let skip = (page.max(1) as usize - 1) * page_size as usize;
        let infos = document
            .active
            .iter()
            .skip(skip)
            .take(page_size as usize)
            .filter_map(|id| document.records.get(id))
            .map(ServiceRecord::info)
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(infos)
    }

    async fn get_rule(&self, service_id: i64, protocol: Protocol) -> Result<Rule, StoreError> {
        let record = self.record(service_id).await?;
        let missing = |entity| StoreError::NotFound { entity, service_id };

        let rule = match protocol {
            Protocol::Http => {
                let http = record.http_rule.as_ref().ok_or_else(|| missing("http_rule"))?;
                Rule::Http(http.to_rule(service_id)?)
            }
            Protocol::Tcp => {
                let tcp = record.tcp_rule.as_ref().ok_or_else(|| missing("tcp_rule"))?;
                Rule::Tcp(TcpRule {
                    service_id,
                    listen_port: parse_listen_port(tcp.port)?,
                })
            }
            Protocol::Grpc => {
                let grpc = record.grpc_rule.as_ref().ok_or_else(|| missing("grpc_rule"))?;
                Rule::Grpc(GrpcRule {
                    service_id,
                    listen_port: parse_listen_port(grpc.port)?,
                    header_transforms: HeaderTransform::parse_list(&grpc.header_transfor)?,
                })
            }
        };
        Ok(rule)
    }

    async fn get_load_balance(&self, service_id: i64) -> Result<LoadBalanceConfig, StoreError> {
        let record = self.record(service_id).await?;
        let load_balance = record.load_balance.as_ref().ok_or(StoreError::NotFound {
            entity: "load_balance",
            service_id,
        })?;
        Ok(load_balance.to_config(service_id)?)
    }

    async fn get_access_control(&self, service_id: i64) -> Result<AccessControlConfig, StoreError> {
        let record = self.record(service_id).await?;
        // 접근 제어 행이 없으면 제한 없음
        let access_control = record.access_control.unwrap_or_default();
        Ok(access_control.to_config(service_id)?)
    }
}

impl std::fmt::Debug for JsonServiceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonServiceStore")
            .field("path", &self.path)
            .finish()
    }
}
