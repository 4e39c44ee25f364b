mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{domain_service, prefix_service, tcp_service, MockStore};
use futures_util::future::join_all;
use service_gateway::balancer::BalancerOptions;
use service_gateway::registry::{LoadState, Registry, RegistryError, RegistryOptions};
use service_gateway::routing::RoutingError;
use service_gateway::service::Protocol;

fn registry(store: Arc<MockStore>) -> Arc<Registry> {
    Arc::new(Registry::new(store, RegistryOptions::default()))
}

fn sample_services() -> Vec<service_gateway::service::ServiceDetail> {
    vec![
        domain_service(1, "shop", "shop.example.com"),
        prefix_service(2, "api", "/api"),
        tcp_service(3, "redis", 6379),
    ]
}

#[tokio::test]
async fn test_lookup_before_load() {
    let registry = registry(Arc::new(MockStore::new(sample_services())));

    assert_eq!(registry.state(), LoadState::Unloaded);
    assert_eq!(registry.match_port(6379).unwrap_err(), RoutingError::NotLoaded);
    assert_eq!(registry.match_http("shop.example.com", "/").unwrap_err(), RoutingError::NotLoaded);
    assert!(registry.snapshot().is_none());
}

#[tokio::test]
async fn test_load_returns_exactly_the_loaded_services() {
    let store = Arc::new(MockStore::new(sample_services()));
    let registry = registry(store.clone());

    registry.load().await.unwrap();
    assert_eq!(registry.state(), LoadState::Loaded);

    assert_eq!(registry.match_http("shop.example.com", "/api/x").unwrap().name(), "shop");
    assert_eq!(registry.match_http("other.com", "/api/x").unwrap().name(), "api");
    assert_eq!(registry.match_port(6379).unwrap().name(), "redis");
    assert!(matches!(
        registry.match_port(6380),
        Err(RoutingError::NoMatchingService { .. })
    ));
    assert_eq!(registry.services_by_protocol(Protocol::Tcp).len(), 1);
    assert_eq!(registry.get("api").unwrap().detail().id(), 2);
}

#[tokio::test]
async fn test_concurrent_first_load_runs_once() {
    let store = Arc::new(MockStore::new(sample_services()).with_delay(Duration::from_millis(20)));
    let registry = registry(store.clone());

    let calls = (0..16).map(|_| {
        let registry = registry.clone();
        async move { registry.load().await }
    });
    let results = join_all(calls).await;

    // 서비스 3개 < 페이지 크기 → 목록 조회 1회, 규칙 조회 3회
    assert_eq!(store.list_calls(), 1);
    assert_eq!(store.rule_calls(), 3);

    let first = results[0].as_ref().unwrap().clone();
    for result in &results {
        assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
    }

    // 이후 load()는 다시 조회하지 않음
    registry.load().await.unwrap();
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_first_load_failure_is_shared() {
    let store = Arc::new(MockStore::new(sample_services()).with_delay(Duration::from_millis(20)));
    store.fail_list(true);
    let registry = registry(store.clone());

    let calls = (0..8).map(|_| {
        let registry = registry.clone();
        async move { registry.load().await }
    });
    let results = join_all(calls).await;

    assert_eq!(store.list_calls(), 1);
    assert!(results
        .iter()
        .all(|result| matches!(result, Err(RegistryError::LoadFailed(_)))));
    assert_eq!(registry.state(), LoadState::Failed);

    // 저장된 실패를 그대로 반환
    store.fail_list(false);
    assert!(registry.load().await.is_err());
    assert_eq!(store.list_calls(), 1);

    // reload는 명시적으로 다시 시도
    registry.reload().await.unwrap();
    assert_eq!(registry.state(), LoadState::Loaded);
    assert_eq!(registry.match_port(6379).unwrap().name(), "redis");
}

#[tokio::test]
async fn test_failed_reload_keeps_prior_snapshot() {
    let store = Arc::new(MockStore::new(sample_services()));
    let registry = registry(store.clone());
    let loaded = registry.load().await.unwrap();

    store.set_services(vec![prefix_service(9, "other", "/other")]);
    store.fail_rule_for(Some(9));

    let err = registry.reload().await.unwrap_err();
    assert!(matches!(err, RegistryError::LoadFailed(_)));
    assert_eq!(registry.state(), LoadState::Loaded);

    let current = registry.snapshot().unwrap();
    assert!(Arc::ptr_eq(&current, &loaded));
    assert_eq!(registry.match_http("shop.example.com", "/").unwrap().name(), "shop");
    assert_eq!(registry.match_http("x", "/api/users").unwrap().name(), "api");
    assert_eq!(registry.match_port(6379).unwrap().name(), "redis");
}

#[tokio::test]
async fn test_reload_publishes_new_snapshot() {
    let store = Arc::new(MockStore::new(sample_services()));
    let registry = registry(store.clone());
    let first = registry.load().await.unwrap();
    assert_eq!(first.version(), 1);

    store.set_services(vec![tcp_service(4, "pg", 5432)]);
    let second = registry.reload().await.unwrap();

    assert_eq!(second.version(), 2);
    assert_eq!(registry.match_port(5432).unwrap().name(), "pg");
    assert!(registry.match_port(6379).is_err());
    assert!(registry.get("shop").is_none());

    // 이전 스냅샷을 들고 있던 쪽은 계속 이전 결과를 봄
    assert_eq!(first.match_port(6379).unwrap().name(), "redis");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reloads_serialize_while_readers_see_whole_snapshots() {
    let store = Arc::new(MockStore::new(sample_services()).with_delay(Duration::from_millis(10)));
    let registry = registry(store.clone());
    registry.load().await.unwrap();
    let calls_per_load = store.call_log().len();
    // 목록 1회 + 서비스당 규칙/밸런서/접근 제어 3회
    assert_eq!(calls_per_load, 10);

    store.set_services(vec![
        domain_service(1, "shop-v2", "shop.example.com"),
        prefix_service(2, "api-v2", "/api"),
        tcp_service(3, "redis-v2", 6379),
    ]);

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let registry = registry.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut lookups = 0usize;
            loop {
                let snapshot = registry.snapshot().unwrap();
                let tcp = snapshot.match_port(6379).unwrap().name().to_string();
                let http = snapshot.match_http("gw.local", "/api/users").unwrap().name().to_string();
                // 한 스냅샷 안에서 세대가 섞이지 않음
                assert!(
                    matches!((tcp.as_str(), http.as_str()), ("redis", "api") | ("redis-v2", "api-v2")),
                    "mixed snapshot: {} / {}",
                    tcp,
                    http
                );

                let name = registry.match_port(6379).unwrap().name().to_string();
                assert!(name == "redis" || name == "redis-v2", "unexpected service: {}", name);
                let name = registry.match_http("shop.example.com", "/").unwrap().name().to_string();
                assert!(name == "shop" || name == "shop-v2", "unexpected service: {}", name);

                lookups += 1;
                if done.load(Ordering::SeqCst) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            lookups
        })
    };

    let (first, second) = tokio::join!(registry.reload(), registry.reload());
    done.store(true, Ordering::SeqCst);
    assert!(reader.await.unwrap() > 0);

    let mut versions = vec![first.unwrap().version(), second.unwrap().version()];
    versions.sort();
    assert_eq!(versions, vec![2, 3]);
    assert_eq!(registry.snapshot().unwrap().version(), 3);
    assert_eq!(registry.state(), LoadState::Loaded);

    // 두 reload의 저장소 호출이 서로 끼어들지 않음
    let log = store.call_log();
    assert_eq!(log.len(), calls_per_load * 3);
    assert_eq!(store.list_calls(), 3);
    for block in log[calls_per_load..].chunks(calls_per_load) {
        assert_eq!(block[0], "list");
        assert!(block[1..].iter().all(|call| call != "list"), "interleaved reload: {:?}", block);
    }
    assert_eq!(registry.match_port(6379).unwrap().name(), "redis-v2");
}

#[tokio::test]
async fn test_paging_fetches_all_pages() {
    let services: Vec<_> = (1..=5)
        .map(|id| tcp_service(id, &format!("svc-{}", id), 7000 + id as u16))
        .collect();
    let store = Arc::new(MockStore::new(services));
    let registry = Registry::new(
        store.clone(),
        RegistryOptions {
            page_size: 2,
            balancer: BalancerOptions::default(),
        },
    );

    let snapshot = registry.load().await.unwrap();
    assert_eq!(snapshot.len(), 5);
    // 2 + 2 + 1
    assert_eq!(store.list_calls(), 3);
}

#[tokio::test]
async fn test_deleted_service_not_loaded() {
    let mut deleted = tcp_service(5, "legacy", 6000);
    deleted.info.deleted = true;
    let store = Arc::new(MockStore::new(vec![deleted, tcp_service(6, "current", 6001)]));
    let registry = registry(store);

    let snapshot = registry.load().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(registry.match_port(6000).is_err());
}

#[tokio::test]
async fn test_port_collision_fails_whole_load() {
    let store = Arc::new(MockStore::new(vec![
        tcp_service(1, "a", 7000),
        tcp_service(2, "b", 7000),
    ]));
    let registry = registry(store);

    let err = registry.load().await.unwrap_err();
    match err {
        RegistryError::Config(e) => assert_eq!(e.field, "listen_port"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(registry.snapshot().is_none());
}
