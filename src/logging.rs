use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, error, info, span, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::settings::logging::{LogFormat, LogOutput, LogSettings};

/// 전역 tracing 구독자를 설치합니다.
///
/// `RUST_LOG`가 설정되어 있으면 설정 파일의 레벨보다 우선합니다. 파일 출력일
/// 때 반환되는 `WorkerGuard`는 프로세스가 끝날 때까지 유지해야 합니다.
pub fn init_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_string().to_lowercase()));

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "gateway.log".into());

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match settings.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    guard
}

/// 디스패치 한 건의 기록
#[derive(Debug)]
pub struct RequestLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub host: String,
    pub client_ip: Option<IpAddr>,
    pub service: Option<String>,
    pub upstream: Option<String>,
    /// 거부/실패 시 클라이언트에 돌려줄 상태 코드. 0이면 업스트림으로 전달됨.
    pub status_code: u16,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RequestLog {
    pub fn new(request_id: String) -> Self {
        debug!(request_id = %request_id, "Creating new request log");
        Self {
            request_id,
            method: String::new(),
            path: String::new(),
            host: String::new(),
            client_ip: None,
            service: None,
            upstream: None,
            status_code: 0,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn with_request<B>(&mut self, req: &hyper::Request<B>) {
        self.method = req.method().to_string();
        self.path = req.uri().path().to_string();
        if let Some(host) = req.headers().get(hyper::header::HOST) {
            self.host = host.to_str().unwrap_or_default().to_string();
        }

        debug!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            host = %self.host,
            "Received request"
        );
    }

    /// TCP/gRPC 연결 기록
    pub fn with_connection(&mut self, protocol: &str, port: u16) {
        self.method = protocol.to_uppercase();
        self.host = format!(":{}", port);

        debug!(
            request_id = %self.request_id,
            protocol = %self.method,
            port = port,
            "Accepted connection"
        );
    }

    pub fn with_client(&mut self, client_ip: IpAddr) {
        self.client_ip = Some(client_ip);
    }

    pub fn with_service(&mut self, service: &str) {
        self.service = Some(service.to_string());
        debug!(
            request_id = %self.request_id,
            service = %service,
            "Matched service"
        );
    }

    pub fn with_upstream(&mut self, upstream: &str) {
        self.upstream = Some(upstream.to_string());
        debug!(
            request_id = %self.request_id,
            upstream = %upstream,
            "Selected upstream"
        );
    }

    pub fn with_error(&mut self, status: hyper::StatusCode, error: impl std::fmt::Display) {
        self.status_code = status.as_u16();
        self.error = Some(error.to_string());
    }
}

pub fn log_request(log: &RequestLog) {
    let level = if log.status_code >= 500 {
        Level::ERROR
    } else if log.status_code >= 400 {
        Level::WARN
    } else {
        Level::INFO
    };

    let span = span!(
        Level::INFO,
        "dispatch",
        request_id = %log.request_id,
        method = %log.method,
        path = %log.path,
        host = %log.host,
        client_ip = ?log.client_ip,
        duration_ms = %log.duration_ms
    );
    let _enter = span.enter();

    match level {
        Level::ERROR => error!(
            service = ?log.service,
            status = log.status_code,
            error = ?log.error,
            "Dispatch failed"
        ),
        Level::WARN => warn!(
            service = ?log.service,
            status = log.status_code,
            error = ?log.error,
            "Dispatch rejected"
        ),
        _ => info!(
            service = ?log.service,
            upstream = ?log.upstream,
            "Dispatch completed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    #[test]
    fn test_request_log_collects_dispatch() {
        let req = hyper::Request::builder()
            .method("POST")
            .uri("/api/orders?page=2")
            .header("host", "shop.example.com")
            .body(())
            .unwrap();

        let mut log = RequestLog::new("req-1".to_string());
        log.with_request(&req);
        log.with_client("10.0.0.7".parse().unwrap());
        log.with_service("orders");
        log.with_upstream("10.0.1.1:8080");

        assert_eq!(log.method, "POST");
        assert_eq!(log.path, "/api/orders");
        assert_eq!(log.host, "shop.example.com");
        assert_eq!(log.upstream.as_deref(), Some("10.0.1.1:8080"));
        assert_eq!(log.status_code, 0);
        log_request(&log);
    }

    #[test]
    fn test_connection_and_error() {
        let mut log = RequestLog::new("req-2".to_string());
        log.with_connection("tcp", 6379);
        log.with_error(StatusCode::SERVICE_UNAVAILABLE, ":6379에 매칭되는 서비스 없음");

        assert_eq!(log.method, "TCP");
        assert_eq!(log.host, ":6379");
        assert_eq!(log.status_code, 503);
        assert!(log.error.is_some());
        log_request(&log);
    }
}
