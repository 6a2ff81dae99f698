//! Difficulty/type mix for a batch.
//!
//! Two strategies share one weight table:
//!   - `RandomDraw`: independent weighted draw per item (long-run proportions)
//!   - `Quota`: exact per-tier counts for the batch, shuffled before use
//!
//! Quota rounding: ceiling for foundation/intermediate/advanced, floor for
//! elite. Elite absorbs any surplus or shortfall; if it is exhausted, the
//! excess is trimmed from advanced, then intermediate, then foundation.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog;
use crate::domain::{Difficulty, QuestionType, Subject};

/// Percent weights in `Difficulty::ALL` order.
pub const DIFFICULTY_PERCENTS: [u32; 4] = [20, 45, 25, 10];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
  #[default]
  #[value(name = "random")]
  RandomDraw,
  Quota,
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Strategy::RandomDraw => "random",
      Strategy::Quota => "quota",
    })
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionPolicy {
  pub difficulty_percents: [u32; 4],
  pub passage_percent: u32,
  pub strategy: Strategy,
}

impl DistributionPolicy {
  pub fn for_subject(subject: Subject, strategy: Strategy) -> Self {
    Self {
      difficulty_percents: DIFFICULTY_PERCENTS,
      passage_percent: catalog::passage_percent(subject),
      strategy,
    }
  }

  /// Every item at one tier; the type mix is unchanged.
  pub fn pinned(mut self, difficulty: Difficulty) -> Self {
    self.difficulty_percents = Difficulty::ALL.map(|d| if d == difficulty { 100 } else { 0 });
    self
  }

  /// Exact tier counts for `n` items; always sums to `n`.
  pub fn quota_counts(&self, n: usize) -> [usize; 4] {
    let share = |pct: u32| n * pct as usize;
    let mut counts = [0usize; 4];
    for (i, pct) in self.difficulty_percents.iter().enumerate() {
      let raw = share(*pct);
      counts[i] = if i == 3 { raw / 100 } else { raw.div_ceil(100) };
    }

    let total: usize = counts.iter().sum();
    if total < n {
      counts[3] += n - total;
    } else {
      let mut excess = total - n;
      for i in (0..4).rev() {
        let take = excess.min(counts[i]);
        counts[i] -= take;
        excess -= take;
        if excess == 0 {
          break;
        }
      }
    }
    counts
  }

  /// (passage, discrete) for `n` items; passage rounds up, discrete takes the rest.
  pub fn type_counts(&self, n: usize) -> (usize, usize) {
    let passage = (n * self.passage_percent as usize).div_ceil(100).min(n);
    (passage, n - passage)
  }

  pub fn draw_difficulty<R: Rng + ?Sized>(&self, rng: &mut R) -> Difficulty {
    let total: u32 = self.difficulty_percents.iter().sum();
    let roll = rng.gen_range(0..total.max(1));
    let mut acc = 0;
    for (d, pct) in Difficulty::ALL.into_iter().zip(self.difficulty_percents) {
      acc += pct;
      if roll < acc {
        return d;
      }
    }
    Difficulty::Elite
  }

  pub fn draw_type<R: Rng + ?Sized>(&self, rng: &mut R) -> QuestionType {
    if rng.gen_range(0..100) < self.passage_percent {
      QuestionType::Passage
    } else {
      QuestionType::Discrete
    }
  }

  /// The (difficulty, type) sequence a batch of `n` items will request.
  pub fn plan<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<(Difficulty, QuestionType)> {
    match self.strategy {
      Strategy::RandomDraw => (0..n).map(|_| (self.draw_difficulty(rng), self.draw_type(rng))).collect(),
      Strategy::Quota => {
        let mut difficulties: Vec<Difficulty> = Difficulty::ALL
          .into_iter()
          .zip(self.quota_counts(n))
          .flat_map(|(d, c)| std::iter::repeat(d).take(c))
          .collect();
        let (passage, discrete) = self.type_counts(n);
        let mut types: Vec<QuestionType> = std::iter::repeat(QuestionType::Passage)
          .take(passage)
          .chain(std::iter::repeat(QuestionType::Discrete).take(discrete))
          .collect();
        difficulties.shuffle(rng);
        types.shuffle(rng);
        difficulties.into_iter().zip(types).collect()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn quota(subject: Subject) -> DistributionPolicy {
    DistributionPolicy::for_subject(subject, Strategy::Quota)
  }

  #[test]
  fn twenty_items_split_four_nine_five_two() {
    assert_eq!(quota(Subject::Biology).quota_counts(20), [4, 9, 5, 2]);
  }

  #[test]
  fn quota_counts_always_sum_to_batch_size() {
    let p = quota(Subject::Biology);
    for n in 0..=50 {
      assert_eq!(p.quota_counts(n).iter().sum::<usize>(), n, "n = {n}");
      let (passage, discrete) = p.type_counts(n);
      assert_eq!(passage + discrete, n);
    }
    assert_eq!(p.quota_counts(1), [1, 0, 0, 0]);
  }

  #[test]
  fn pinned_policy_uses_one_tier_under_both_strategies() {
    let mut rng = StdRng::seed_from_u64(9);
    for difficulty in Difficulty::ALL {
      for strategy in [Strategy::Quota, Strategy::RandomDraw] {
        let p = DistributionPolicy::for_subject(Subject::Biology, strategy).pinned(difficulty);
        let plan = p.plan(13, &mut rng);
        assert_eq!(plan.len(), 13);
        assert!(plan.iter().all(|(d, _)| *d == difficulty), "{strategy} {difficulty}");
      }
    }
  }

  #[test]
  fn passage_share_depends_on_subject() {
    assert_eq!(quota(Subject::Biology).type_counts(10), (6, 4));
    assert_eq!(quota(Subject::Biochemistry).type_counts(10), (7, 3));
  }

  #[test]
  fn quota_plan_has_exact_multiset() {
    let mut rng = StdRng::seed_from_u64(7);
    let plan = quota(Subject::Biology).plan(20, &mut rng);
    assert_eq!(plan.len(), 20);
    let elite = plan.iter().filter(|(d, _)| *d == Difficulty::Elite).count();
    let passage = plan.iter().filter(|(_, t)| *t == QuestionType::Passage).count();
    assert_eq!(elite, 2);
    assert_eq!(passage, 12);
  }

  #[test]
  fn random_draw_approaches_weights() {
    let p = DistributionPolicy::for_subject(Subject::Biology, Strategy::RandomDraw);
    let mut rng = StdRng::seed_from_u64(42);
    let plan = p.plan(10_000, &mut rng);
    let intermediate = plan.iter().filter(|(d, _)| *d == Difficulty::Intermediate).count();
    let passage = plan.iter().filter(|(_, t)| *t == QuestionType::Passage).count();
    assert!((4_200..4_800).contains(&intermediate), "{intermediate}");
    assert!((5_700..6_300).contains(&passage), "{passage}");
  }
}
