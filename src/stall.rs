use rand::{rngs::StdRng, Rng, SeedableRng};

/// Stall pattern configuration. Each channel instantiates its own
/// [`StallPattern`] from it, so patterns never share a cursor.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum PauseGenerator {
    /// Never stall.
    #[default]
    None,
    /// Repeat the given decisions forever; `true` pauses the channel for that cycle.
    Cycle(Vec<bool>),
    /// Pause each cycle with the given probability.
    Random { probability: f64, seed: u64 },
}

/// Proceed three cycles out of four.
pub fn cycle_pause() -> PauseGenerator {
    PauseGenerator::Cycle(vec![false, false, false, true])
}

impl PauseGenerator {
    /// Builds a cyclic pattern from 0/1 values, 1 meaning pause.
    pub fn from_bits(bits: &[u8]) -> Self {
        PauseGenerator::Cycle(bits.iter().map(|&b| b != 0).collect())
    }

    pub fn random(probability: f64, seed: u64) -> Self {
        PauseGenerator::Random {
            probability: probability.clamp(0.0, 1.0),
            seed,
        }
    }

    /// A fresh pattern for one channel. Random patterns are decorrelated
    /// across channels by `salt`; cyclic patterns start at their first entry.
    pub fn pattern(&self, salt: u64) -> StallPattern {
        match self {
            PauseGenerator::None => StallPattern::never(),
            PauseGenerator::Cycle(bits) if bits.is_empty() => StallPattern::never(),
            PauseGenerator::Cycle(bits) => StallPattern(PatternKind::Cycle {
                bits: bits.clone(),
                pos: 0,
            }),
            PauseGenerator::Random { probability, seed } => {
                StallPattern(PatternKind::Random {
                    rng: StdRng::seed_from_u64(seed ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
                    probability: probability.clamp(0.0, 1.0),
                })
            }
        }
    }
}

#[derive(Debug)]
enum PatternKind {
    Never,
    Cycle { bits: Vec<bool>, pos: usize },
    Random { rng: StdRng, probability: f64 },
}

/// Lazy, infinite sequence of per-cycle stall decisions (`true` = pause).
#[derive(Debug)]
pub struct StallPattern(PatternKind);

impl StallPattern {
    pub fn never() -> Self {
        StallPattern(PatternKind::Never)
    }
}

impl Default for StallPattern {
    fn default() -> Self {
        StallPattern::never()
    }
}

impl Iterator for StallPattern {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        let pause = match &mut self.0 {
            PatternKind::Never => false,
            PatternKind::Cycle { bits, pos } => {
                let pause = bits[*pos];
                *pos = (*pos + 1) % bits.len();
                pause
            }
            PatternKind::Random { rng, probability } => rng.gen_bool(*probability),
        };
        Some(pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_never_stalls() {
        assert!(PauseGenerator::None.pattern(0).take(100).all(|p| !p));
        assert!(StallPattern::default().take(10).all(|p| !p));
    }

    #[test]
    fn canonical_pattern_proceeds_three_of_four() {
        let seq: Vec<bool> = cycle_pause().pattern(0).take(8).collect();
        assert_eq!(seq, vec![false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn patterns_are_independent_instances() {
        let gen = PauseGenerator::from_bits(&[1, 1, 1, 0]);
        let mut a = gen.pattern(0);
        let mut b = gen.pattern(1);
        a.next();
        a.next();
        // b starts from the beginning regardless of a's cursor
        assert_eq!(b.next(), Some(true));
        assert_eq!(a.next(), Some(true));
        assert_eq!(a.next(), Some(false));
    }

    #[test]
    fn random_patterns_are_reproducible_and_salted() {
        let gen = PauseGenerator::random(0.5, 42);
        let a: Vec<bool> = gen.pattern(3).take(64).collect();
        let b: Vec<bool> = gen.pattern(3).take(64).collect();
        let c: Vec<bool> = gen.pattern(4).take(64).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn probability_is_clamped() {
        assert!(PauseGenerator::random(7.0, 1).pattern(0).take(20).all(|p| p));
    }
}
