use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::balancer::BalancerOptions;
use crate::routing::RoutingError;
use crate::service::{Protocol, ServiceDetail};

use super::entry::ServiceEntry;
use super::error::RegistryError;
use super::snapshot::Snapshot;
use super::store::ServiceStore;

const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// 서비스 목록 조회 페이지 크기
    pub page_size: u32,
    pub balancer: BalancerOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            balancer: BalancerOptions::default(),
        }
    }
}

/// 외부에 노출되는 로드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug)]
enum Status {
    Unloaded,
    Loading,
    Loaded,
    Failed(RegistryError),
}

/// 서비스 레지스트리
///
/// 조회는 원자적으로 게시된 스냅샷을 읽기만 하므로 잠금이 없습니다.
/// `load`와 `reload`는 `writer` 잠금으로 서로 직렬화되며, 새 스냅샷은 잠금 없이
/// 따로 만든 뒤 한 번에 교체됩니다.
pub struct Registry {
    store: Arc<dyn ServiceStore>,
    options: RegistryOptions,
    writer: Mutex<()>,
    status: RwLock<Status>,
    snapshot: ArcSwapOption<Snapshot>,
}

impl Registry {
    pub fn new(store: Arc<dyn ServiceStore>, options: RegistryOptions) -> Self {
        Self {
            store,
            options,
            writer: Mutex::new(()),
            status: RwLock::new(Status::Unloaded),
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// 최초 로드를 수행합니다.
    ///
    /// 프로세스 수명 동안 한 번만 실제로 실행됩니다. 동시에 들어온 최초 호출자들은
    /// 모두 같은 한 번의 로드를 기다리고 같은 결과(성공 또는 에러)를 받습니다.
    /// 이후 호출은 저장된 결과를 그대로 돌려줍니다.
    pub async fn load(&self) -> Result<Arc<Snapshot>, RegistryError> {
        if let Some(outcome) = self.settled() {
            return outcome;
        }

        let _guard = self.writer.lock().await;
        if let Some(outcome) = self.settled() {
            return outcome;
        }

        *self.status.write() = Status::Loading;
        self.rebuild("load").await
    }

    /// 현재 상태와 상관없이 새 스냅샷을 만들어 교체합니다.
    ///
    /// 실패하면 이전 스냅샷이 그대로 유지되고 에러는 호출자에게만 전달됩니다.
    pub async fn reload(&self) -> Result<Arc<Snapshot>, RegistryError> {
        let _guard = self.writer.lock().await;
        *self.status.write() = Status::Loading;
        self.rebuild("reload").await
    }

    pub fn state(&self) -> LoadState {
        match &*self.status.read() {
            Status::Unloaded => LoadState::Unloaded,
            Status::Loading => LoadState::Loading,
            Status::Loaded => LoadState::Loaded,
            Status::Failed(_) => LoadState::Failed,
        }
    }

    /// 현재 게시된 스냅샷
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    pub fn match_http(&self, host: &str, path: &str) -> Result<Arc<ServiceEntry>, RoutingError> {
        let guard = self.snapshot.load();
        match &*guard {
            Some(snapshot) => snapshot.match_http(host, path).cloned(),
            None => Err(RoutingError::NotLoaded),
        }
    }

    pub fn match_port(&self, port: u16) -> Result<Arc<ServiceEntry>, RoutingError> {
        let guard = self.snapshot.load();
        match &*guard {
            Some(snapshot) => snapshot.match_port(port).cloned(),
            None => Err(RoutingError::NotLoaded),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        let guard = self.snapshot.load();
        guard.as_deref().and_then(|snapshot| snapshot.get(name).cloned())
    }

    pub fn services_by_protocol(&self, protocol: Protocol) -> Vec<Arc<ServiceEntry>> {
        let guard = self.snapshot.load();
        guard
            .as_deref()
            .map(|snapshot| snapshot.services_by_protocol(protocol))
            .unwrap_or_default()
    }

    fn settled(&self) -> Option<Result<Arc<Snapshot>, RegistryError>> {
        match &*self.status.read() {
            Status::Loaded => self.snapshot.load_full().map(Ok),
            Status::Failed(e) => Some(Err(e.clone())),
            Status::Unloaded | Status::Loading => None,
        }
    }

    async fn rebuild(&self, trigger: &str) -> Result<Arc<Snapshot>, RegistryError> {
        let started = Instant::now();
        let previous = self.snapshot.load_full();
        let version = previous.as_ref().map_or(1, |snapshot| snapshot.version() + 1);

        let result = match self.fetch_all().await {
            Ok(details) => Snapshot::build(details, self.options.balancer, version)
                .map_err(RegistryError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot.store(Some(snapshot.clone()));
                *self.status.write() = Status::Loaded;
                info!(
                    trigger = %trigger,
                    version = version,
                    services = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "서비스 레지스트리 로드 완료"
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!(trigger = %trigger, error = %e, "서비스 레지스트리 로드 실패");
                *self.status.write() = match previous {
                    Some(previous) => {
                        info!(version = previous.version(), "이전 스냅샷 유지");
                        Status::Loaded
                    }
                    None => Status::Failed(e.clone()),
                };
                Err(e)
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<ServiceDetail>, RegistryError> {
        let page_size = self.options.page_size.max(1);
        let mut infos = Vec::new();
        let mut page = 1;

        loop {
            let batch = self.store.list_active_services(page, page_size).await?;
            let fetched = batch.len();
            infos.extend(batch);
            debug!(page = page, fetched = fetched, "서비스 목록 페이지 조회");

            if fetched < page_size as usize {
                break;
            }
            page += 1;
        }

        let mut details = Vec::with_capacity(infos.len());
        for info in infos {
            let rule = self.store.get_rule(info.id, info.protocol).await?;
            let load_balance = self.store.get_load_balance(info.id).await?;
            let access_control = self.store.get_access_control(info.id).await?;
            details.push(ServiceDetail::new(info, rule, load_balance, access_control)?);
        }
        Ok(details)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("state", &self.state())
            .field("version", &self.snapshot.load().as_deref().map(Snapshot::version))
            .finish()
    }
}
