use rand::Rng;

use crate::runner::registry::RunnerRegistry;
use crate::runner::types::{Sequence, TestGroup};

/// 按注册表的调度方式选出本次调用要执行的组
///
/// - sequential: 所有组按序
/// - random: 等概率抽一个
/// - weighted: 在 [0,1) 抽一个点，落在哪个累积区间选哪个组；
///   区间是左闭右开的，边界点只计一次
/// - thread: worker 编号对组数取模
pub fn select<'a, R: Rng>(
    registry: &'a RunnerRegistry,
    worker_index: usize,
    rng: &mut R,
) -> Vec<&'a TestGroup> {
    let groups = registry.groups();
    if groups.is_empty() {
        return Vec::new();
    }

    match registry.sequence() {
        Sequence::Sequential => groups.iter().collect(),
        Sequence::Random => {
            let index = rng.random_range(0..groups.len());
            vec![&groups[index]]
        }
        Sequence::Weighted => {
            let pick: f64 = rng.random();
            let cumulative = registry.cumulative_weights();
            let index = cumulative
                .iter()
                .position(|upper| pick < *upper)
                .unwrap_or(groups.len() - 1);
            vec![&groups[index]]
        }
        Sequence::Thread => vec![&groups[worker_index % groups.len()]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Document, Request};
    use crate::runner::registry::RunnerRegistry;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn doc(filename: &str) -> Document {
        let mut document = Document::new().with_filename(filename);
        document.add_request(Request::new("http://x/", "GET", 1));
        document
    }

    fn registry(sequence: Sequence, weights: &[f64]) -> RunnerRegistry {
        let mut builder = RunnerRegistry::builder().sequence(sequence);
        for (i, weight) in weights.iter().enumerate() {
            let filename = format!("g{}.webtest", i);
            builder = builder
                .document(doc(&filename))
                .unwrap()
                .group(TestGroup::new(&filename).with_weight(*weight));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_sequential_selects_all_in_order() {
        let registry = registry(Sequence::Sequential, &[1.0, 1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(0);

        let selected = select(&registry, 0, &mut rng);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].members[0], "g0.webtest");
        assert_eq!(selected[2].members[0], "g2.webtest");
    }

    #[test]
    fn test_random_selects_one_member() {
        let registry = registry(Sequence::Random, &[1.0, 1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let selected = select(&registry, 0, &mut rng);
            assert_eq!(selected.len(), 1);
            assert!(registry.groups().contains(selected[0]));
        }
    }

    #[test]
    fn test_thread_assignment_wraps() {
        let registry = registry(Sequence::Thread, &[1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(0);

        let picks: Vec<&str> = (0..5)
            .map(|index| select(&registry, index, &mut rng)[0].members[0].as_str())
            .collect();
        assert_eq!(
            picks,
            vec![
                "g0.webtest",
                "g1.webtest",
                "g0.webtest",
                "g1.webtest",
                "g0.webtest"
            ]
        );
    }

    #[test]
    fn test_weighted_respects_proportions() {
        // 权重 1:3，抽样比例应接近 0.25/0.75
        let registry = registry(Sequence::Weighted, &[1.0, 3.0]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            let selected = select(&registry, 0, &mut rng);
            match selected[0].members[0].as_str() {
                "g0.webtest" => counts[0] += 1,
                _ => counts[1] += 1,
            }
        }

        let ratio = counts[0] as f64 / 10_000.0;
        assert!((ratio - 0.25).abs() < 0.03, "ratio was {}", ratio);
    }
}
