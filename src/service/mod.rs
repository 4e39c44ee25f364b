//! 서비스 설정 모델
//!
//! 스냅샷마다 불변인 값 타입들을 정의합니다. 생성 시점 검증 외에는 동작이 없습니다.

mod access_control;
mod detail;
mod error;
mod info;
mod load_balance;
mod rule;

pub use access_control::{AccessControlConfig, IpRule};
pub use detail::ServiceDetail;
pub use error::ConfigError;
pub use info::{Protocol, ServiceInfo};
pub use load_balance::{BalancePolicy, LoadBalanceConfig, Upstream};
pub use rule::{
    parse_listen_port, GrpcRule, HeaderOp, HeaderTransform, HttpMatchKind, HttpRule, Rule,
    TcpRule, UrlRewrite,
};
