use crate::time::Duration;

#[derive(Debug)]
pub(crate) struct Rand {
    state: u64,
}

impl Rand {
    pub(crate) const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn rand_u32(&mut self) -> u32 {
        // sPCG32 from https://www.pcg-random.org/paper.html
        // see also https://nullprogram.com/blog/2017/09/21/
        const M: u64 = 0xbb2efcec3c39611d;
        const A: u64 = 0x7590ef39;

        let s = self.state.wrapping_mul(M).wrapping_add(A);
        self.state = s;

        let shift = 29 - (s >> 61);
        (s >> shift) as u32
    }

    /// Return a value in `min..=max`.
    pub(crate) fn rand_range(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        match (max - min).checked_add(1) {
            Some(span) => min + self.rand_u32() % span,
            None => self.rand_u32(),
        }
    }

    /// Return a delay in `0..=max`, with millisecond granularity.
    pub(crate) fn rand_delay(&mut self, max: Duration) -> Duration {
        let max_millis = u32::try_from(max.total_millis()).unwrap_or(u32::MAX);
        Duration::from_millis(self.rand_range(0, max_millis) as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rand_range_bounds() {
        let mut rand = Rand::new(0x1234);
        for _ in 0..1000 {
            let value = rand.rand_range(10, 20);
            assert!((10..=20).contains(&value));
        }
    }

    #[test]
    fn test_rand_range_degenerate() {
        let mut rand = Rand::new(7);
        assert_eq!(rand.rand_range(5, 5), 5);
        assert_eq!(rand.rand_range(9, 3), 9);
    }

    #[test]
    fn test_rand_delay_never_exceeds_max() {
        let mut rand = Rand::new(42);
        let max = Duration::from_millis(2500);
        for _ in 0..1000 {
            assert!(rand.rand_delay(max) <= max);
        }
        assert_eq!(rand.rand_delay(Duration::ZERO), Duration::ZERO);
    }
}
