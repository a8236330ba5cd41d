use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seed used when the host cannot provide entropy.
const FALLBACK_SEED: u64 = 0x5eed_f10c;

/// Create the simulation RNG. A nonzero seed replays the same flock; `0`
/// asks the host for entropy.
pub fn create_rng(seed: u64) -> ChaCha8Rng {
    if seed != 0 {
        return ChaCha8Rng::seed_from_u64(seed);
    }

    match getrandom::u64() {
        Ok(entropy) => ChaCha8Rng::seed_from_u64(entropy),
        Err(e) => {
            log::warn!("no entropy source ({}), using a fixed seed", e);
            ChaCha8Rng::seed_from_u64(FALLBACK_SEED)
        }
    }
}
