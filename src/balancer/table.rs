/// 누적 가중치 표. 구간 [0, total) 위의 점을 후보 인덱스로 O(log n)에 변환합니다.
#[derive(Debug, Clone, Default)]
pub(crate) struct WeightTable {
    cumulative: Vec<u64>,
}

impl WeightTable {
    pub(crate) fn build<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut sum = 0u64;
        let cumulative = weights
            .into_iter()
            .map(|weight| {
                sum += u64::from(weight);
                sum
            })
            .collect();
        Self { cumulative }
    }

    pub(crate) fn total(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// `point`가 속한 구간의 후보 인덱스. `point`는 `total()`보다 작아야 합니다.
    pub(crate) fn pick(&self, point: u64) -> usize {
        self.cumulative.partition_point(|&bound| bound <= point)
    }
}
