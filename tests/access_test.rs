mod common;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{prefix_service, FixedCounter};
use service_gateway::access::flow::{client_flow_key, service_flow_key};
use service_gateway::access::{
    AccessController, Admission, DenyReason, FailurePolicy, FlowCounter, MemoryFlowCounter,
};
use service_gateway::service::{AccessControlConfig, ServiceDetail};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn service_with(acl: impl FnOnce(&mut AccessControlConfig)) -> ServiceDetail {
    let mut detail = prefix_service(7, "orders", "/orders");
    acl(&mut detail.access_control);
    detail
}

fn controller(counter: FixedCounter) -> AccessController {
    AccessController::new(Arc::new(counter))
}

#[tokio::test]
async fn test_whitelist_overrides_blacklist() {
    let detail = service_with(|acl| {
        acl.auth_enabled = true;
        acl.white_list = AccessControlConfig::parse_ip_list("white_list", "10.0.0.1").unwrap();
        acl.black_list = AccessControlConfig::parse_ip_list("black_list", "10.0.0.1").unwrap();
    });
    let access = controller(FixedCounter::new());

    assert_eq!(access.admit(&detail, ip("10.0.0.1")).await, Admission::Allowed);
    assert_eq!(
        access.admit(&detail, ip("10.0.0.2")).await,
        Admission::Denied(DenyReason::NotWhitelisted)
    );
}

#[tokio::test]
async fn test_blacklist_reported_before_rate_limit() {
    let detail = service_with(|acl| {
        acl.auth_enabled = true;
        acl.black_list = AccessControlConfig::parse_ip_list("black_list", "192.168.0.0/16").unwrap();
        acl.service_qps_limit = 10;
        acl.client_qps_limit = 1;
    });
    let counter = FixedCounter::new()
        .with_qps(&service_flow_key(7), 500)
        .with_qps(&client_flow_key(7, ip("192.168.3.4")), 500);
    let access = controller(counter);

    assert_eq!(
        access.admit(&detail, ip("192.168.3.4")).await,
        Admission::Denied(DenyReason::Blacklisted)
    );
}

#[tokio::test]
async fn test_service_limit_boundary() {
    let detail = service_with(|acl| acl.service_qps_limit = 100);

    let at_limit = controller(FixedCounter::new().with_qps(&service_flow_key(7), 100));
    assert_eq!(
        at_limit.admit(&detail, ip("10.0.0.1")).await,
        Admission::Denied(DenyReason::ServiceRateLimited)
    );

    let below_limit = controller(FixedCounter::new().with_qps(&service_flow_key(7), 99));
    assert_eq!(below_limit.admit(&detail, ip("10.0.0.1")).await, Admission::Allowed);
}

#[tokio::test]
async fn test_client_limit_is_per_client() {
    let detail = service_with(|acl| acl.client_qps_limit = 5);
    let access = controller(FixedCounter::new().with_qps(&client_flow_key(7, ip("10.0.0.1")), 5));

    assert_eq!(
        access.admit(&detail, ip("10.0.0.1")).await,
        Admission::Denied(DenyReason::ClientRateLimited)
    );
    assert_eq!(access.admit(&detail, ip("10.0.0.2")).await, Admission::Allowed);
}

#[tokio::test]
async fn test_auth_disabled_skips_lists_only() {
    let detail = service_with(|acl| {
        acl.auth_enabled = false;
        acl.black_list = AccessControlConfig::parse_ip_list("black_list", "10.0.0.1").unwrap();
        acl.service_qps_limit = 1;
    });

    let idle = controller(FixedCounter::new());
    assert!(idle.admit(&detail, ip("10.0.0.1")).await.is_allowed());

    let busy = controller(FixedCounter::new().with_qps(&service_flow_key(7), 1));
    assert_eq!(
        busy.admit(&detail, ip("10.0.0.1")).await.reason(),
        Some(DenyReason::ServiceRateLimited)
    );
}

#[tokio::test]
async fn test_unlimited_service_never_queries_counter() {
    let detail = service_with(|_| {});
    let access = controller(FixedCounter::new().failing());
    assert!(access.admit(&detail, ip("10.0.0.1")).await.is_allowed());
}

#[tokio::test]
async fn test_counter_timeout_policy() {
    let detail = service_with(|acl| acl.service_qps_limit = 10);

    let closed = AccessController::new(Arc::new(
        FixedCounter::new().with_delay(Duration::from_millis(200)),
    ))
    .with_timeout(Duration::from_millis(10));
    assert_eq!(
        closed.admit(&detail, ip("10.0.0.1")).await,
        Admission::Denied(DenyReason::CounterUnavailable)
    );

    let open = AccessController::new(Arc::new(
        FixedCounter::new().with_delay(Duration::from_millis(200)),
    ))
    .with_timeout(Duration::from_millis(10))
    .with_failure_policy(FailurePolicy::Open);
    assert_eq!(open.admit(&detail, ip("10.0.0.1")).await, Admission::Allowed);
}

#[tokio::test]
async fn test_counter_error_fails_closed_by_default() {
    let detail = service_with(|acl| acl.client_qps_limit = 10);
    let access = controller(FixedCounter::new().failing());

    let err = access.check(&detail, ip("10.0.0.1")).await.unwrap_err();
    assert_eq!(err.reason, DenyReason::CounterUnavailable);
    assert_eq!(err.service, "orders");
}

#[tokio::test]
async fn test_record_feeds_memory_counter() {
    let detail = service_with(|acl| acl.service_qps_limit = 2);
    let counter = Arc::new(MemoryFlowCounter::new());
    let access = AccessController::new(counter.clone());
    let client = ip("10.0.0.9");

    for _ in 0..2 {
        assert!(access.admit(&detail, client).await.is_allowed());
        access.record(&detail, client).await.unwrap();
    }

    assert_eq!(counter.qps(&client_flow_key(7, client)).await.unwrap().total, 2);
    assert_eq!(
        access.admit(&detail, client).await,
        Admission::Denied(DenyReason::ServiceRateLimited)
    );
}
