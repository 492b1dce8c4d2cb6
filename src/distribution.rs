// ===============================
// src/distribution.rs (spread an integer delta across N days)
// ===============================
//
// Three policies:
// 1) Even  -> floor(delta/days) each, remainder goes to the LAST r days
// 2) Early -> weight w_i = days - i (day 0 heaviest)
// 3) Late  -> weight w_i = i + 1    (last day heaviest)
//
// Weighted policies allocate floor(delta * w_i / sum_w) and hand the leftover
// out one unit at a time, heaviest day first. The sum of the output always
// equals the input delta.
//
use crate::domain::DistributionWeight;

pub fn distribute(delta: i64, days: usize, weight: DistributionWeight) -> Vec<i64> {
    if days == 0 {
        return Vec::new();
    }
    if days == 1 {
        return vec![delta.max(0)];
    }
    if delta <= 0 {
        return vec![0; days];
    }
    match weight {
        DistributionWeight::Even => distribute_even(delta, days),
        DistributionWeight::Early => distribute_weighted(delta, days, |i| (days - i) as i128),
        DistributionWeight::Late => distribute_weighted(delta, days, |i| (i + 1) as i128),
    }
}

fn distribute_even(delta: i64, days: usize) -> Vec<i64> {
    let n = days as i64;
    let base = delta / n;
    let remainder = (delta - base * n) as usize;
    let mut out = vec![base; days];
    for slot in out.iter_mut().skip(days - remainder) {
        *slot += 1;
    }
    out
}

fn distribute_weighted(delta: i64, days: usize, weight_of: impl Fn(usize) -> i128) -> Vec<i64> {
    let weights: Vec<i128> = (0..days).map(&weight_of).collect();
    let total_w: i128 = weights.iter().sum();
    let d = delta as i128;

    let mut out: Vec<i64> = weights.iter().map(|w| (d * w / total_w) as i64).collect();
    let mut remaining = delta - out.iter().sum::<i64>();

    // heaviest first; ties keep day order
    let mut order: Vec<usize> = (0..days).collect();
    order.sort_by(|a, b| weights[*b].cmp(&weights[*a]).then(a.cmp(b)));

    while remaining > 0 {
        for &i in &order {
            if remaining == 0 {
                break;
            }
            out[i] += 1;
            remaining -= 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const ALL: [DistributionWeight; 3] = [
        DistributionWeight::Even,
        DistributionWeight::Early,
        DistributionWeight::Late,
    ];

    #[test]
    fn zero_days_is_empty() {
        for w in ALL {
            assert!(distribute(42, 0, w).is_empty());
        }
    }

    #[test]
    fn single_day_shortcut() {
        for w in ALL {
            assert_eq!(distribute(17, 1, w), vec![17]);
            assert_eq!(distribute(0, 1, w), vec![0]);
            assert_eq!(distribute(-5, 1, w), vec![0]);
        }
    }

    #[test]
    fn non_positive_delta_is_all_zeros() {
        for w in ALL {
            assert_eq!(distribute(0, 4, w), vec![0, 0, 0, 0]);
            assert_eq!(distribute(-50, 3, w), vec![0, 0, 0]);
        }
    }

    #[test]
    fn even_puts_remainder_on_last_days() {
        assert_eq!(distribute(10, 4, DistributionWeight::Even), vec![2, 2, 3, 3]);
        assert_eq!(distribute(200, 10, DistributionWeight::Even), vec![20; 10]);
        assert_eq!(distribute(2, 5, DistributionWeight::Even), vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn early_and_late_mirror_each_other() {
        // weights 4,3,2,1 -> sum 10
        assert_eq!(distribute(10, 4, DistributionWeight::Early), vec![4, 3, 2, 1]);
        assert_eq!(distribute(10, 4, DistributionWeight::Late), vec![1, 2, 3, 4]);

        let early = distribute(7, 3, DistributionWeight::Early);
        let mut late = distribute(7, 3, DistributionWeight::Late);
        late.reverse();
        assert_eq!(early, late);
    }

    #[test]
    fn weighted_remainder_goes_to_heaviest_days() {
        // weights 3,2,1 (sum 6): floors of 5*3/6, 5*2/6, 5*1/6 = 2,1,0 -> 2 left
        assert_eq!(distribute(5, 3, DistributionWeight::Early), vec![3, 2, 0]);
        assert_eq!(distribute(5, 3, DistributionWeight::Late), vec![0, 2, 3]);
    }

    #[test]
    fn randomized_invariants_hold() {
        let mut rng = rand::thread_rng();
        for _ in 0..2_000 {
            let delta: i64 = rng.gen_range(0..100_000);
            let days: usize = rng.gen_range(1..120);
            for w in ALL {
                let out = distribute(delta, days, w);
                assert_eq!(out.len(), days);
                assert_eq!(out.iter().sum::<i64>(), delta, "{w:?} {delta} {days}");
                assert!(out.iter().all(|v| *v >= 0));
                if w == DistributionWeight::Even {
                    let max = *out.iter().max().unwrap();
                    let min = *out.iter().min().unwrap();
                    assert!(max - min <= 1);
                }
            }
        }
    }

    #[test]
    fn large_delta_does_not_overflow() {
        let out = distribute(i64::MAX / 4, 365, DistributionWeight::Late);
        assert_eq!(out.iter().sum::<i64>(), i64::MAX / 4);
    }
}
