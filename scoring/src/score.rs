//! Point arithmetic.
//!
//! Scores only ever come from awarded points. There is no floor, no minimum
//! and no upward clamp: a suite whose checks fail reports a low score.

use crate::error::{ScoringError, ScoringResult};
use crate::types::CheckOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub awarded: u32,
    pub max: u32,
}

impl Score {
    pub fn new(awarded: u32, max: u32) -> Self {
        Self { awarded, max }
    }

    /// Integer percentage, rounded down. Zero when nothing could be earned.
    pub fn percent(&self) -> u8 {
        if self.max == 0 {
            return 0;
        }
        let pct = (self.awarded as u64 * 100) / self.max as u64;
        pct.min(100) as u8
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score {
            awarded: self.awarded.saturating_add(rhs.awarded),
            max: self.max.saturating_add(rhs.max),
        }
    }
}

impl Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Score {
        iter.fold(Score::default(), Add::add)
    }
}

impl<'a> Sum<&'a CheckOutcome> for Score {
    fn sum<I: Iterator<Item = &'a CheckOutcome>>(iter: I) -> Score {
        iter.map(|c| Score::new(c.awarded, c.max_points)).sum()
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.awarded, self.max, self.percent())
    }
}

/// `points * passed / total`, rounded down.
pub fn proportional(points: u32, passed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let passed = passed.min(total);
    ((points as u64 * passed) / total) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Exclusive upper bound of the measured value for this tier.
    pub below: f64,
    pub points: u32,
}

/// Maps a measured value (lower is better) onto points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreLadder {
    tiers: Vec<Tier>,
}

impl ScoreLadder {
    pub fn new(tiers: Vec<Tier>) -> ScoringResult<Self> {
        if tiers.is_empty() {
            return Err(ScoringError::InvalidLadder {
                message: "ladder needs at least one tier".to_string(),
            });
        }

        for tier in &tiers {
            if !tier.below.is_finite() {
                return Err(ScoringError::InvalidLadder {
                    message: format!("tier bound {} is not finite", tier.below),
                });
            }
        }

        for pair in tiers.windows(2) {
            if pair[1].below <= pair[0].below {
                return Err(ScoringError::InvalidLadder {
                    message: format!(
                        "tier bounds must strictly increase ({} then {})",
                        pair[0].below, pair[1].below
                    ),
                });
            }
            if pair[1].points > pair[0].points {
                return Err(ScoringError::InvalidLadder {
                    message: format!(
                        "tier points must not increase with the bound ({} then {})",
                        pair[0].points, pair[1].points
                    ),
                });
            }
        }

        Ok(Self { tiers })
    }

    /// Response-time ladder in milliseconds, out of 20 points.
    pub fn response_time() -> Self {
        Self {
            tiers: vec![
                Tier {
                    below: 50.0,
                    points: 20,
                },
                Tier {
                    below: 100.0,
                    points: 15,
                },
                Tier {
                    below: 200.0,
                    points: 10,
                },
                Tier {
                    below: 500.0,
                    points: 5,
                },
            ],
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn max_points(&self) -> u32 {
        self.tiers.first().map(|t| t.points).unwrap_or(0)
    }

    pub fn award(&self, value: f64) -> u32 {
        if value.is_nan() {
            return 0;
        }
        self.tiers
            .iter()
            .find(|tier| value < tier.below)
            .map(|tier| tier.points)
            .unwrap_or(0)
    }

    /// Award rescaled so the best tier is worth `points`.
    pub fn scaled_award(&self, value: f64, points: u32) -> u32 {
        let max = self.max_points();
        if max == 0 {
            return 0;
        }
        proportional(points, self.award(value) as u64, max as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(Score::new(2, 3).percent(), 66);
        assert_eq!(Score::new(79, 100).percent(), 79);
        assert_eq!(Score::new(0, 50).percent(), 0);
        assert_eq!(Score::new(50, 50).percent(), 100);
    }

    #[test]
    fn test_empty_score_is_zero_not_perfect() {
        assert_eq!(Score::default().percent(), 0);
    }

    #[test]
    fn test_score_sum() {
        let total: Score = vec![Score::new(10, 10), Score::new(0, 20), Score::new(5, 10)]
            .into_iter()
            .sum();
        assert_eq!(total, Score::new(15, 40));
        assert_eq!(total.to_string(), "15/40 (37%)");
    }

    #[test]
    fn test_score_sum_saturates() {
        let total = Score::new(3_000_000_000, 3_000_000_000) + Score::new(0, 3_000_000_000);
        assert_eq!(total, Score::new(3_000_000_000, u32::MAX));
        assert_eq!(total.percent(), 69);
    }

    #[test]
    fn test_proportional() {
        assert_eq!(proportional(20, 9, 10), 18);
        assert_eq!(proportional(20, 1, 3), 6);
        assert_eq!(proportional(20, 0, 0), 0);
        assert_eq!(proportional(20, 15, 10), 20);
    }

    #[test]
    fn test_response_time_ladder() {
        let ladder = ScoreLadder::response_time();
        assert_eq!(ladder.max_points(), 20);
        assert_eq!(ladder.award(10.0), 20);
        assert_eq!(ladder.award(50.0), 15);
        assert_eq!(ladder.award(199.9), 10);
        assert_eq!(ladder.award(499.0), 5);
        assert_eq!(ladder.award(500.0), 0);
        assert_eq!(ladder.award(f64::NAN), 0);
    }

    #[test]
    fn test_scaled_award() {
        let ladder = ScoreLadder::response_time();
        assert_eq!(ladder.scaled_award(10.0, 40), 40);
        assert_eq!(ladder.scaled_award(75.0, 40), 30);
        assert_eq!(ladder.scaled_award(900.0, 40), 0);
    }

    #[test]
    fn test_ladder_validation() {
        assert!(ScoreLadder::new(vec![]).is_err());

        let unordered = vec![
            Tier {
                below: 100.0,
                points: 10,
            },
            Tier {
                below: 50.0,
                points: 5,
            },
        ];
        assert!(ScoreLadder::new(unordered).is_err());

        let rewarding_slowness = vec![
            Tier {
                below: 50.0,
                points: 5,
            },
            Tier {
                below: 100.0,
                points: 10,
            },
        ];
        assert!(ScoreLadder::new(rewarding_slowness).is_err());

        let ok = vec![
            Tier {
                below: 1.0,
                points: 3,
            },
            Tier {
                below: 2.0,
                points: 3,
            },
        ];
        assert!(ScoreLadder::new(ok).is_ok());
    }
}
