use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::service::{BalancePolicy, LoadBalanceConfig, Upstream};

use super::error::BalanceError;
use super::table::WeightTable;

/// 수동 장애 감지(passive ejection) 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancerOptions {
    /// 연속 실패 횟수가 이 값에 도달하면 업스트림을 일시 제외합니다. 0이면 비활성.
    pub max_fails: u32,
    pub fail_timeout: Duration,
}

impl Default for BalancerOptions {
    fn default() -> Self {
        Self {
            max_fails: 3,
            fail_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct FailureState {
    consecutive: u32,
    ejected_until: Option<Instant>,
}

/// 서비스 하나의 업스트림 선택기
///
/// 스냅샷마다 한 번 만들어지며, 커서와 smooth WRR 상태는 이 서비스에만
/// 속하므로 다른 서비스의 선택을 막지 않습니다.
#[derive(Debug)]
pub struct LoadBalancer {
    service: String,
    policy: BalancePolicy,
    upstreams: Vec<Upstream>,
    /// 비활성/금지 목록을 제외한 후보 인덱스
    eligible: Vec<usize>,
    table: WeightTable,
    cursor: AtomicUsize,
    current_weights: Mutex<Vec<i64>>,
    failures: Mutex<HashMap<usize, FailureState>>,
    options: BalancerOptions,
}

impl LoadBalancer {
    pub fn new(service: &str, config: &LoadBalanceConfig, options: BalancerOptions) -> Self {
        let upstreams = config.upstreams.clone();
        let eligible: Vec<usize> = upstreams
            .iter()
            .enumerate()
            .filter(|(_, upstream)| {
                !upstream.disabled && upstream.weight > 0 && !config.is_forbidden(&upstream.address)
            })
            .map(|(index, _)| index)
            .collect();
        let table = WeightTable::build(eligible.iter().map(|&index| upstreams[index].weight));

        debug!(
            service = %service,
            policy = ?config.policy,
            total = upstreams.len(),
            eligible = eligible.len(),
            "로드밸런서 생성"
        );

        Self {
            service: service.to_string(),
            policy: config.policy,
            current_weights: Mutex::new(vec![0; upstreams.len()]),
            upstreams,
            eligible,
            table,
            cursor: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
            options,
        }
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    /// 정책에 따라 업스트림 주소 하나를 고릅니다.
    ///
    /// 비활성, 금지 목록, 일시 제외된 업스트림은 후보에서 빠집니다. 일시 제외만으로
    /// 후보가 모두 사라지면 제외를 무시하고 원래 후보를 사용합니다.
    pub fn select(&self, client_ip: IpAddr) -> Result<String, BalanceError> {
        if self.eligible.is_empty() {
            warn!(service = %self.service, "사용 가능한 업스트림 없음");
            return Err(BalanceError::NoAvailableUpstream {
                service: self.service.clone(),
            });
        }

        let (candidates, table) = self.candidates();
        if candidates.is_empty() || table.total() == 0 {
            warn!(service = %self.service, "가중치가 남은 업스트림 없음");
            return Err(BalanceError::NoAvailableUpstream {
                service: self.service.clone(),
            });
        }
        let index = match self.policy {
            BalancePolicy::RoundRobin => {
                let position = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates[position]
            }
            BalancePolicy::WeightedRoundRobin => self.smooth_weighted(&candidates),
            BalancePolicy::IpHash => candidates[table.pick(client_hash(client_ip) % table.total())],
            BalancePolicy::Random => {
                let point = rand::rng().random_range(0..table.total());
                candidates[table.pick(point)]
            }
        };

        let address = self.upstreams[index].address.clone();
        debug!(service = %self.service, upstream = %address, client_ip = %client_ip, "업스트림 선택");
        Ok(address)
    }

    /// 업스트림 요청 실패를 기록합니다.
    pub fn report_failure(&self, address: &str) {
        if self.options.max_fails == 0 {
            return;
        }
        let Some(index) = self.index_of(address) else {
            return;
        };

        let mut failures = self.failures.lock();
        let state = failures.entry(index).or_default();
        state.consecutive += 1;
        if state.consecutive >= self.options.max_fails {
            state.consecutive = 0;
            state.ejected_until = Some(Instant::now() + self.options.fail_timeout);
            warn!(
                service = %self.service,
                upstream = %address,
                timeout_secs = self.options.fail_timeout.as_secs(),
                "연속 실패로 업스트림 일시 제외"
            );
        }
    }

    pub fn report_success(&self, address: &str) {
        if let Some(index) = self.index_of(address) {
            self.failures.lock().remove(&index);
        }
    }

    /// 현재 일시 제외 중인 업스트림 주소
    pub fn ejected(&self) -> Vec<String> {
        self.ejected_indices()
            .into_iter()
            .map(|index| self.upstreams[index].address.clone())
            .collect()
    }

    fn index_of(&self, address: &str) -> Option<usize> {
        self.upstreams.iter().position(|upstream| upstream.address == address)
    }

    fn ejected_indices(&self) -> Vec<usize> {
        let mut failures = self.failures.lock();
        if failures.is_empty() {
            return Vec::new();
        }

        let now = Instant::now();
        let mut ejected = Vec::new();
        failures.retain(|&index, state| match state.ejected_until {
            Some(until) if until > now => {
                ejected.push(index);
                true
            }
            // 제외 기간이 끝나면 상태를 초기화
            Some(_) => false,
            None => true,
        });
        ejected
    }

    fn candidates(&self) -> (Cow<'_, [usize]>, Cow<'_, WeightTable>) {
        let ejected = self.ejected_indices();
        if ejected.is_empty() {
            return (Cow::Borrowed(&self.eligible), Cow::Borrowed(&self.table));
        }

        let remaining: Vec<usize> = self
            .eligible
            .iter()
            .copied()
            .filter(|index| !ejected.contains(index))
            .collect();
        if remaining.is_empty() {
            debug!(service = %self.service, "모든 후보가 일시 제외됨, 제외 무시");
            return (Cow::Borrowed(&self.eligible), Cow::Borrowed(&self.table));
        }

        let table = WeightTable::build(remaining.iter().map(|&index| self.upstreams[index].weight));
        (Cow::Owned(remaining), Cow::Owned(table))
    }

    /// Nginx 방식 smooth weighted round-robin
    fn smooth_weighted(&self, candidates: &[usize]) -> usize {
        let mut current = self.current_weights.lock();
        let mut total = 0i64;
        let mut best = candidates[0];

        for &index in candidates {
            let weight = i64::from(self.upstreams[index].weight);
            current[index] += weight;
            total += weight;
            if current[index] > current[best] {
                best = index;
            }
        }

        current[best] -= total;
        best
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 클라이언트 주소의 FNV-1a 해시. 툴체인이 바뀌어도 같은 주소는 같은 값을 냅니다.
fn client_hash(client_ip: IpAddr) -> u64 {
    let octets = match client_ip.to_canonical() {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    octets
        .iter()
        .fold(FNV_OFFSET, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn balancer(policy: BalancePolicy, addresses: &str, weights: &str) -> LoadBalancer {
        let config = LoadBalanceConfig::parse(1, policy, addresses, weights).unwrap();
        LoadBalancer::new("test", &config, BalancerOptions::default())
    }

    fn client() -> IpAddr {
        "192.168.0.10".parse().unwrap()
    }

    fn count(lb: &LoadBalancer, calls: usize) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..calls {
            *counts.entry(lb.select(client()).unwrap()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_weighted_round_robin_ratio() {
        let lb = balancer(BalancePolicy::WeightedRoundRobin, "10.0.0.1:80,10.0.0.2:80", "1,3");
        let counts = count(&lb, 4000);

        let first = counts["10.0.0.1:80"];
        let second = counts["10.0.0.2:80"];
        assert!((950..=1050).contains(&first), "first={}", first);
        assert!((2950..=3050).contains(&second), "second={}", second);
    }

    #[test]
    fn test_weighted_round_robin_is_smooth() {
        let lb = balancer(BalancePolicy::WeightedRoundRobin, "a:1,b:1,c:1", "5,1,1");
        let picks: Vec<String> = (0..7).map(|_| lb.select(client()).unwrap()).collect();
        assert_eq!(picks, vec!["a:1", "a:1", "b:1", "a:1", "c:1", "a:1", "a:1"]);
    }

    #[test]
    fn test_round_robin_cycles() {
        let lb = balancer(BalancePolicy::RoundRobin, "a:1,b:1,c:1", "1,1,1");
        let picks: Vec<String> = (0..4).map(|_| lb.select(client()).unwrap()).collect();
        assert_eq!(picks, vec!["a:1", "b:1", "c:1", "a:1"]);
    }

    #[test]
    fn test_ip_hash_is_sticky() {
        let lb = balancer(BalancePolicy::IpHash, "a:1,b:1,c:1,d:1", "1,1,1,1");
        let first = lb.select(client()).unwrap();
        for _ in 0..50 {
            assert_eq!(lb.select(client()).unwrap(), first);
        }
    }

    #[test]
    fn test_client_hash_is_fixed() {
        // FNV-1a 기준값
        assert_eq!(client_hash("0.0.0.0".parse().unwrap()), 0x4d25_767f_9dce_13f5);
        assert_eq!(
            client_hash("::ffff:192.168.0.10".parse().unwrap()),
            client_hash("192.168.0.10".parse().unwrap())
        );
        assert_ne!(
            client_hash("192.168.0.10".parse().unwrap()),
            client_hash("192.168.0.11".parse().unwrap())
        );
    }

    #[test]
    fn test_zero_weight_candidates_never_panic() {
        for policy in [
            BalancePolicy::Random,
            BalancePolicy::RoundRobin,
            BalancePolicy::WeightedRoundRobin,
            BalancePolicy::IpHash,
        ] {
            let mut upstream = Upstream::new("a:1", 0);
            upstream.disabled = false;
            let config = LoadBalanceConfig::new(1, policy, vec![upstream]);
            let lb = LoadBalancer::new("zero", &config, BalancerOptions::default());
            assert_eq!(
                lb.select(client()).unwrap_err(),
                BalanceError::NoAvailableUpstream { service: "zero".to_string() },
                "policy {:?}",
                policy
            );
        }
    }

    #[test]
    fn test_zero_weight_upstream_skipped_by_every_policy() {
        for policy in [
            BalancePolicy::Random,
            BalancePolicy::RoundRobin,
            BalancePolicy::WeightedRoundRobin,
            BalancePolicy::IpHash,
        ] {
            let mut idle = Upstream::new("a:1", 0);
            idle.disabled = false;
            let config = LoadBalanceConfig::new(1, policy, vec![idle, Upstream::new("b:1", 2)]);
            let lb = LoadBalancer::new("mixed", &config, BalancerOptions::default());
            for _ in 0..20 {
                assert_eq!(lb.select(client()).unwrap(), "b:1", "policy {:?}", policy);
            }
        }
    }

    #[test]
    fn test_random_respects_weights() {
        let lb = balancer(BalancePolicy::Random, "a:1,b:1", "1,0");
        let counts = count(&lb, 200);
        assert_eq!(counts.get("a:1"), Some(&200));
    }

    #[test]
    fn test_forbidden_and_disabled_excluded() {
        let config = LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1,b:1,c:1", "1,0,1")
            .unwrap()
            .with_forbidden_list("c:1");
        let lb = LoadBalancer::new("test", &config, BalancerOptions::default());
        for _ in 0..5 {
            assert_eq!(lb.select(client()).unwrap(), "a:1");
        }
    }

    #[test]
    fn test_no_available_upstream() {
        let config = LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1,b:1", "1,0")
            .unwrap()
            .with_forbidden_list("a:1");
        let lb = LoadBalancer::new("orders", &config, BalancerOptions::default());
        assert_eq!(
            lb.select(client()).unwrap_err(),
            BalanceError::NoAvailableUpstream { service: "orders".to_string() }
        );
    }

    #[test]
    fn test_passive_ejection() {
        let config = LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1,b:1", "1,1").unwrap();
        let options = BalancerOptions { max_fails: 2, fail_timeout: Duration::from_secs(60) };
        let lb = LoadBalancer::new("test", &config, options);

        lb.report_failure("a:1");
        assert!(lb.ejected().is_empty());
        lb.report_failure("a:1");
        assert_eq!(lb.ejected(), vec!["a:1".to_string()]);

        for _ in 0..4 {
            assert_eq!(lb.select(client()).unwrap(), "b:1");
        }

        lb.report_success("a:1");
        assert!(lb.ejected().is_empty());
    }

    #[test]
    fn test_ejecting_everything_falls_back() {
        let config = LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1", "1").unwrap();
        let options = BalancerOptions { max_fails: 1, fail_timeout: Duration::from_secs(60) };
        let lb = LoadBalancer::new("test", &config, options);

        lb.report_failure("a:1");
        assert_eq!(lb.select(client()).unwrap(), "a:1");
    }

    #[test]
    fn test_ejection_expires() {
        let config = LoadBalanceConfig::parse(1, BalancePolicy::RoundRobin, "a:1,b:1", "1,1").unwrap();
        let options = BalancerOptions { max_fails: 1, fail_timeout: Duration::ZERO };
        let lb = LoadBalancer::new("test", &config, options);

        lb.report_failure("a:1");
        assert!(lb.ejected().is_empty());
    }

    #[test]
    fn test_concurrent_weighted_selection() {
        let lb = Arc::new(balancer(BalancePolicy::WeightedRoundRobin, "a:1,b:1", "1,3"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    let mut counts = HashMap::new();
                    for _ in 0..500 {
                        *counts.entry(lb.select(client()).unwrap()).or_insert(0usize) += 1;
                    }
                    counts
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for (address, n) in handle.join().unwrap() {
                *totals.entry(address).or_insert(0) += n;
            }
        }
        // 잠금으로 보호되므로 전체 분포는 정확히 1:3
        assert_eq!(totals["a:1"], 1000);
        assert_eq!(totals["b:1"], 3000);
    }
}
