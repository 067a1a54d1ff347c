//! Seeded Random Number Generator
//!
//! Xorshift128+ generator used for serves, bot imprecision, and watchdog
//! coin flips. Every room owns one, seeded from its id and players, so a
//! room replays identically under test.

use sha2::{Sha256, Digest};

/// Seeded PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use pong_arena::core::rng::MatchRng;
///
/// let mut a = MatchRng::new(12345);
/// let mut b = MatchRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct MatchRng {
    state: [u64; 2],
}

impl Default for MatchRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MatchRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, so weak seeds
    /// (0, 1, 2...) still produce well-spread sequences.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift state must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from a room id and its player names.
    pub fn for_room(room_id: &uuid::Uuid, players: &[&str]) -> Self {
        Self::new(derive_room_seed(room_id, players))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a float in [0, 1).
    #[inline]
    pub fn next_unit(&mut self) -> f32 {
        // 24 high bits fit exactly in an f32 mantissa
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a float in [min, max).
    #[inline]
    pub fn next_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        min + (max - min) * self.next_unit()
    }

    /// Unweighted coin flip.
    #[inline]
    pub fn coin_flip(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }

    /// Random sign: `1.0` or `-1.0` with equal probability.
    #[inline]
    pub fn next_sign(&mut self) -> f32 {
        if self.coin_flip() {
            1.0
        } else {
            -1.0
        }
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a room seed from its id and player names.
///
/// Player names are hashed in slot order; swapping slots gives a different
/// seed.
pub fn derive_room_seed(room_id: &uuid::Uuid, players: &[&str]) -> u64 {
    let mut hasher = Sha256::new();

    hasher.update(b"PONG_ARENA_ROOM_SEED_V1");
    hasher.update(room_id.as_bytes());

    for name in players {
        hasher.update((name.len() as u32).to_le_bytes());
        hasher.update(name.as_bytes());
    }

    let hash = hasher.finalize();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut rng1 = MatchRng::new(42);
        let mut rng2 = MatchRng::new(42);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut rng1 = MatchRng::new(1);
        let mut rng2 = MatchRng::new(2);
        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_unit_range() {
        let mut rng = MatchRng::new(7);
        for _ in 0..10_000 {
            let v = rng.next_unit();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_next_range_bounds() {
        let mut rng = MatchRng::new(99);
        for _ in 0..10_000 {
            let v = rng.next_range(-40.0, 40.0);
            assert!((-40.0..40.0).contains(&v));
        }
        assert_eq!(rng.next_range(5.0, 5.0), 5.0);
    }

    #[test]
    fn test_coin_flip_roughly_fair() {
        let mut rng = MatchRng::new(2024);
        let heads = (0..10_000).filter(|_| rng.coin_flip()).count();
        assert!(heads > 4_500 && heads < 5_500, "heads = {}", heads);
    }

    #[test]
    fn test_room_seed_depends_on_slot_order() {
        let id = uuid::Uuid::from_bytes([7; 16]);
        let a = derive_room_seed(&id, &["alice", "bob"]);
        let b = derive_room_seed(&id, &["bob", "alice"]);
        assert_ne!(a, b);
        assert_eq!(a, derive_room_seed(&id, &["alice", "bob"]));
    }
}
