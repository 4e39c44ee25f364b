use std::fmt;
use std::str::FromStr;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use regex_lite as regex;

use super::{ConfigError, Protocol};
use crate::routing::HostInfo;

/// 포트 번호 유효 범위
const MIN_PORT: i64 = 1;
const MAX_PORT: i64 = 65535;

/// 저장소에서 읽은 포트 값을 검증합니다.
pub fn parse_listen_port(value: i64) -> Result<u16, ConfigError> {
    if !(MIN_PORT..=MAX_PORT).contains(&value) {
        return Err(ConfigError::new(
            "listen_port",
            format!("포트는 {}-{} 범위여야 합니다: {}", MIN_PORT, MAX_PORT, value),
        ));
    }
    Ok(value as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMatchKind {
    /// 요청 호스트와 정확히 일치
    Domain,
    /// 요청 경로의 접두사
    PathPrefix,
}

impl HttpMatchKind {
    /// 기존 관리 DB의 숫자 코드(0=prefix, 1=domain)를 변환합니다.
    pub fn from_rule_type(rule_type: i64) -> Result<Self, ConfigError> {
        match rule_type {
            0 => Ok(HttpMatchKind::PathPrefix),
            1 => Ok(HttpMatchKind::Domain),
            other => Err(ConfigError::new(
                "rule_type",
                format!("알 수 없는 규칙 유형: {}", other),
            )),
        }
    }
}

impl FromStr for HttpMatchKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "domain" => Ok(HttpMatchKind::Domain),
            "prefix" | "path_prefix" | "prefix_url" => Ok(HttpMatchKind::PathPrefix),
            _ => Err(ConfigError::new(
                "rule_type",
                format!("알 수 없는 규칙 유형: {}", s),
            )),
        }
    }
}

/// 경로 재작성 규칙 한 줄 (`<정규식> <치환 문자열>`)
#[derive(Debug, Clone)]
pub struct UrlRewrite {
    pub pattern: String,
    pub replacement: String,
    regex: regex::Regex,
}

impl UrlRewrite {
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let mut parts = line.split_whitespace();
        let (pattern, replacement) = match (parts.next(), parts.next(), parts.next()) {
            (Some(pattern), Some(replacement), None) => (pattern, replacement),
            _ => {
                return Err(ConfigError::new(
                    "url_rewrite",
                    format!("'<정규식> <치환>' 형식이어야 합니다: {}", line),
                ))
            }
        };

        let regex = regex::Regex::new(pattern).map_err(|e| {
            ConfigError::new("url_rewrite", format!("잘못된 정규식 {}: {}", pattern, e))
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            regex,
        })
    }

    /// 줄 단위로 구분된 규칙 목록을 파싱합니다. 빈 줄은 무시합니다.
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ConfigError> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn apply(&self, path: &str) -> String {
        self.regex.replace(path, self.replacement.as_str()).into_owned()
    }
}

impl PartialEq for UrlRewrite {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.replacement == other.replacement
    }
}

impl Eq for UrlRewrite {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOp {
    /// 값을 덧붙임 (기존 값 유지)
    Add,
    Remove,
    /// 기존 값을 덮어씀
    Edit,
}

impl fmt::Display for HeaderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderOp::Add => f.write_str("add"),
            HeaderOp::Remove => f.write_str("del"),
            HeaderOp::Edit => f.write_str("edit"),
        }
    }
}

/// 헤더 변환 규칙 한 줄 (`add|del|edit <이름> [값]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTransform {
    pub op: HeaderOp,
    pub name: HeaderName,
    pub value: Option<HeaderValue>,
}

impl HeaderTransform {
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let mut parts = line.split_whitespace();
        let op = match parts.next() {
            Some("add") => HeaderOp::Add,
            Some("del") | Some("remove") => HeaderOp::Remove,
            Some("edit") => HeaderOp::Edit,
            _ => {
                return Err(ConfigError::new(
                    "header_transforms",
                    format!("알 수 없는 헤더 연산: {}", line),
                ))
            }
        };

        let name = parts
            .next()
            .ok_or_else(|| ConfigError::new("header_transforms", format!("헤더 이름 누락: {}", line)))?;
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::new("header_transforms", format!("잘못된 헤더 이름 {}: {}", name, e))
        })?;

        let rest = parts.collect::<Vec<_>>().join(" ");
        let value = match op {
            HeaderOp::Remove => None,
            HeaderOp::Add | HeaderOp::Edit => {
                if rest.is_empty() {
                    return Err(ConfigError::new(
                        "header_transforms",
                        format!("{} 연산에는 값이 필요합니다: {}", op, line),
                    ));
                }
                Some(HeaderValue::from_str(&rest).map_err(|e| {
                    ConfigError::new("header_transforms", format!("잘못된 헤더 값 {}: {}", rest, e))
                })?)
            }
        };

        Ok(Self { op, name, value })
    }

    pub fn parse_list(text: &str) -> Result<Vec<Self>, ConfigError> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        match (&self.op, &self.value) {
            (HeaderOp::Add, Some(value)) => {
                headers.append(self.name.clone(), value.clone());
            }
            (HeaderOp::Edit, Some(value)) => {
                headers.insert(self.name.clone(), value.clone());
            }
            (HeaderOp::Remove, _) => {
                headers.remove(&self.name);
            }
            _ => {}
        }
    }
}

/// HTTP 서비스 라우팅 규칙
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRule {
    pub service_id: i64,
    pub match_kind: HttpMatchKind,
    pub pattern: String,
    pub require_tls: bool,
    pub strip_prefix: bool,
    pub enable_websocket: bool,
    pub rewrite_rules: Vec<UrlRewrite>,
    pub header_transforms: Vec<HeaderTransform>,
}

impl HttpRule {
    pub fn new(service_id: i64, match_kind: HttpMatchKind, pattern: impl Into<String>) -> Self {
        Self {
            service_id,
            match_kind,
            pattern: pattern.into(),
            require_tls: false,
            strip_prefix: false,
            enable_websocket: false,
            rewrite_rules: Vec::new(),
            header_transforms: Vec::new(),
        }
    }

    pub fn domain(service_id: i64, domain: impl Into<String>) -> Self {
        Self::new(service_id, HttpMatchKind::Domain, domain)
    }

    pub fn prefix(service_id: i64, prefix: impl Into<String>) -> Self {
        Self::new(service_id, HttpMatchKind::PathPrefix, prefix)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::new("pattern", "HTTP 규칙 패턴이 비어 있습니다"));
        }

        match self.match_kind {
            HttpMatchKind::Domain => {
                if self.pattern.contains('/') || self.pattern.contains(char::is_whitespace) {
                    return Err(ConfigError::new(
                        "pattern",
                        format!("도메인에 '/' 또는 공백이 포함될 수 없습니다: {}", self.pattern),
                    ));
                }
                let host = HostInfo::from_header_value(&self.pattern)
                    .map_err(|e| ConfigError::new("pattern", e.to_string()))?;
                // 매칭 시 요청 호스트의 포트를 떼므로 포트가 붙은 도메인은 매칭될 수 없음
                if host.port.is_some() {
                    return Err(ConfigError::new(
                        "pattern",
                        format!("도메인 규칙에는 포트를 지정할 수 없습니다: {}", self.pattern),
                    ));
                }
            }
            HttpMatchKind::PathPrefix => {
                if !self.pattern.starts_with('/') {
                    return Err(ConfigError::new(
                        "pattern",
                        format!("경로 접두사는 '/'로 시작해야 합니다: {}", self.pattern),
                    ));
                }
            }
        }
        Ok(())
    }

    /// 도메인 색인 키. 도메인 규칙이 아니거나 형식이 잘못되면 `None`입니다.
    pub fn domain_key(&self) -> Option<String> {
        match self.match_kind {
            HttpMatchKind::Domain => HostInfo::from_header_value(self.pattern.trim())
                .ok()
                .map(|host| host.name),
            HttpMatchKind::PathPrefix => None,
        }
    }

    /// 업스트림으로 보낼 경로를 계산합니다.
    ///
    /// 접두사 규칙이고 `strip_prefix`가 켜져 있으면 접두사를 먼저 제거한 뒤,
    /// 재작성 규칙을 순서대로 적용합니다.
    pub fn rewrite_path(&self, path: &str) -> String {
        let mut rewritten = if self.strip_prefix && self.match_kind == HttpMatchKind::PathPrefix {
            match path.strip_prefix(self.pattern.as_str()) {
                Some(rest) if rest.starts_with('/') => rest.to_string(),
                Some(rest) => format!("/{}", rest),
                None => path.to_string(),
            }
        } else {
            path.to_string()
        };

        for rule in &self.rewrite_rules {
            rewritten = rule.apply(&rewritten);
        }
        rewritten
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        for transform in &self.header_transforms {
            transform.apply(headers);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpRule {
    pub service_id: i64,
    pub listen_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcRule {
    pub service_id: i64,
    pub listen_port: u16,
    pub header_transforms: Vec<HeaderTransform>,
}

/// 프로토콜별 규칙. 서비스마다 정확히 하나만 존재합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Http(HttpRule),
    Tcp(TcpRule),
    Grpc(GrpcRule),
}

impl Rule {
    pub fn protocol(&self) -> Protocol {
        match self {
            Rule::Http(_) => Protocol::Http,
            Rule::Tcp(_) => Protocol::Tcp,
            Rule::Grpc(_) => Protocol::Grpc,
        }
    }

    pub fn service_id(&self) -> i64 {
        match self {
            Rule::Http(rule) => rule.service_id,
            Rule::Tcp(rule) => rule.service_id,
            Rule::Grpc(rule) => rule.service_id,
        }
    }

    /// TCP/gRPC 규칙의 리슨 포트. HTTP 규칙은 `None`입니다.
    pub fn listen_port(&self) -> Option<u16> {
        match self {
            Rule::Http(_) => None,
            Rule::Tcp(rule) => Some(rule.listen_port),
            Rule::Grpc(rule) => Some(rule.listen_port),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Rule::Http(rule) => rule.validate(),
            Rule::Tcp(TcpRule { listen_port, .. }) | Rule::Grpc(GrpcRule { listen_port, .. }) => {
                parse_listen_port(i64::from(*listen_port)).map(|_| ())
            }
        }
    }
}
