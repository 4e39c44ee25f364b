use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::FlowError;

/// 서비스 단위 유량 키 접두사
pub const SERVICE_FLOW_PREFIX: &str = "flow_service_";
/// 클라이언트 단위 유량 키 접두사
pub const CLIENT_FLOW_PREFIX: &str = "flow_client_";

/// `flow_service_<service_id>`
pub fn service_flow_key(service_id: i64) -> String {
    format!("{}{}", SERVICE_FLOW_PREFIX, service_id)
}

/// `flow_client_<service_id>_<ip>`
pub fn client_flow_key(service_id: i64, client_ip: IpAddr) -> String {
    format!("{}{}_{}", CLIENT_FLOW_PREFIX, service_id, client_ip.to_canonical())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowStat {
    /// 누적 요청 수
    pub total: u64,
    /// 현재 초당 요청 수
    pub qps: u64,
}

/// 외부 유량 카운터 협력자
#[async_trait]
pub trait FlowCounter: Send + Sync {
    /// 키의 누적 요청 수와 현재 QPS를 조회합니다.
    async fn qps(&self, key: &str) -> Result<FlowStat, FlowError>;

    /// 허용된 요청 하나를 기록합니다.
    async fn increment(&self, key: &str) -> Result<(), FlowError>;
}

/// 고정 윈도 카운터
#[derive(Debug)]
struct FlowWindow {
    total: u64,
    window_start: Instant,
    count: u64,
    last_seen: Instant,
}

impl FlowWindow {
    fn new(now: Instant) -> Self {
        Self {
            total: 0,
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
    }
}

/// 프로세스 내 메모리 기반 유량 카운터
///
/// 클라이언트 키는 주소마다 하나씩 생기므로 [`cleanup`](Self::cleanup)을
/// 주기적으로 호출해 오래 조용한 키를 비워야 합니다.
#[derive(Debug, Clone)]
pub struct MemoryFlowCounter {
    windows: Arc<RwLock<HashMap<String, FlowWindow>>>,
    window: Duration,
}

impl MemoryFlowCounter {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            window: window.max(Duration::from_millis(1)),
        }
    }

    /// `idle`보다 오래 요청이 없던 클라이언트 키를 지우고 지운 개수를 돌려줍니다.
    /// 서비스 키는 누적 요청 수를 유지해야 하므로 남깁니다.
    pub async fn cleanup(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|key, window| {
            !key.starts_with(CLIENT_FLOW_PREFIX) || now.duration_since(window.last_seen) < idle
        });
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed = removed, remaining = windows.len(), "유휴 클라이언트 유량 키 정리");
        }
        removed
    }

    /// 현재 추적 중인 키 개수
    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.windows.read().await.is_empty()
    }

    fn per_second(&self, count: u64) -> u64 {
        let window_ms = self.window.as_millis().max(1);
        (u128::from(count) * 1000 / window_ms) as u64
    }
}

impl Default for MemoryFlowCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowCounter for MemoryFlowCounter {
    async fn qps(&self, key: &str) -> Result<FlowStat, FlowError> {
        let windows = self.windows.read().await;
        let stat = match windows.get(key) {
            Some(window) => {
                let current = if window.window_start.elapsed() < self.window {
                    window.count
                } else {
                    0
                };
                FlowStat {
                    total: window.total,
                    qps: self.per_second(current),
                }
            }
            None => FlowStat::default(),
        };
        Ok(stat)
    }

    async fn increment(&self, key: &str) -> Result<(), FlowError> {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "새로운 유량 윈도 생성");
            FlowWindow::new(now)
        });

        window.roll(now, self.window);
        window.last_seen = now;
        window.total += 1;
        window.count += 1;
        Ok(())
    }
}
