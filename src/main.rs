use std::process;
use std::sync::Arc;

use service_gateway::access::MemoryFlowCounter;
use service_gateway::gateway::Gateway;
use service_gateway::logging::init_logging;
use service_gateway::registry::{JsonServiceStore, Registry};
use service_gateway::service::Protocol;
use service_gateway::settings::{ConfigWatcher, Settings};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            process::exit(1);
        }
    };

    let _log_guard = init_logging(&settings.logging);

    let store = match JsonServiceStore::new(&settings.registry.services_file) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "서비스 저장소 초기화 실패");
            process::exit(1);
        }
    };

    let registry = Arc::new(Registry::new(store, settings.registry_options()));

    // 최초 로드 실패는 치명적
    let snapshot = match registry.load().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(error = %e, "서비스 레지스트리 최초 로드 실패");
            process::exit(1);
        }
    };

    for protocol in [Protocol::Tcp, Protocol::Grpc] {
        for entry in snapshot.services_by_protocol(protocol) {
            info!(
                service = %entry.name(),
                protocol = %protocol,
                address = %entry.detail().access_address(&settings.cluster),
                nodes = entry.detail().total_nodes(),
                "포트 리스너 대상 서비스"
            );
        }
    }

    let counter = Arc::new(MemoryFlowCounter::with_window(settings.access.flow_window()));
    {
        let counter = counter.clone();
        let idle = settings.access.flow_idle();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                counter.cleanup(idle).await;
            }
        });
    }

    let gateway = Gateway::new(registry.clone(), settings.access.controller(counter))
        .with_trust_forwarded(settings.access.trust_forwarded);
    info!(
        services = snapshot.len(),
        cluster = %settings.cluster.ip,
        "게이트웨이 코어 준비 완료"
    );

    if settings.registry.watch {
        let mut watcher = ConfigWatcher::new(&settings.registry.services_file);
        match watcher.start() {
            Ok(()) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    while let Some(event) = watcher.watch().await {
                        let event = watcher.drain().unwrap_or(event);
                        if !event.needs_reload() {
                            warn!(event = ?event, "서비스 정의 파일이 삭제됨, 현재 스냅샷 유지");
                            continue;
                        }
                        // 실패 시 이전 스냅샷이 계속 사용됨
                        if let Ok(snapshot) = registry.reload().await {
                            info!(version = snapshot.version(), "서비스 정의 재로드");
                        }
                    }
                });
            }
            Err(e) => warn!(error = %e, "서비스 정의 파일 감시 실패, 자동 재로드 비활성"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "종료 신호 대기 실패");
    }
    info!(registry = ?gateway.registry(), "게이트웨이 종료");
}
