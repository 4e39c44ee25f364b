//! HTTP 요청에서 매칭 입력을 뽑아내는 도우미

use std::net::IpAddr;

use hyper::header;

use super::error::RoutingError;
use super::host::HostInfo;

/// 매칭에 쓰이는 요청 대상 (호스트 + 경로)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTarget {
    pub host: HostInfo,
    pub path: String,
}

impl RequestTarget {
    /// 인덱스 매칭에 넘길 호스트 문자열 (포트 제외)
    pub fn host_name(&self) -> &str {
        &self.host.name
    }
}

/// 요청의 Host 헤더와 URI 경로를 추출합니다.
///
/// Host 헤더가 없거나 문자열로 읽을 수 없으면 에러를 반환합니다.
pub fn extract_target<B>(req: &hyper::Request<B>) -> Result<RequestTarget, RoutingError> {
    let host = match req.headers().get(header::HOST) {
        Some(value) => value,
        None => match req.uri().authority() {
            // HTTP/2 또는 절대 URI 요청
            Some(authority) => {
                return Ok(RequestTarget {
                    host: HostInfo::from_header_value(authority.as_str())?,
                    path: req.uri().path().to_string(),
                })
            }
            None => return Err(RoutingError::MissingHost),
        },
    };

    let host_str = host.to_str().map_err(|e| RoutingError::HeaderParseError {
        header_name: "Host".to_string(),
        error: e.to_string(),
    })?;

    // 호스트에서 경로 부분 제거
    let host_name = host_str.split('/').next().unwrap_or(host_str);

    Ok(RequestTarget {
        host: HostInfo::from_header_value(host_name.trim())?,
        path: req.uri().path().to_string(),
    })
}

/// 클라이언트 IP를 결정합니다.
///
/// `trust_forwarded`가 켜져 있으면 `X-Forwarded-For`의 첫 항목, 그다음
/// `X-Real-IP`를 보고, 둘 다 없거나 잘못된 값이면 소켓 주소를 씁니다.
pub fn client_ip<B>(req: &hyper::Request<B>, peer: IpAddr, trust_forwarded: bool) -> IpAddr {
    if !trust_forwarded {
        return peer.to_canonical();
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        req.headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded.or_else(real_ip).unwrap_or(peer).to_canonical()
}
