//! Deterministic RNG streams segregated by simulation domain.
//!
//! Each stochastic subsystem draws from its own stream so that adding a draw
//! in one place does not shift the sequence seen by another.

use hmac::{Hmac, Mac};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha2::Sha256;
use std::cell::{RefCell, RefMut};

/// Deterministic bundle of RNG streams for one run.
#[derive(Debug, Clone)]
pub struct RngBundle {
    discovery: RefCell<CountingRng<SmallRng>>,
    helpers: RefCell<CountingRng<SmallRng>>,
    rewards: RefCell<CountingRng<SmallRng>>,
    policy: RefCell<CountingRng<SmallRng>>,
}

impl RngBundle {
    /// Construct the bundle from a user-visible seed.
    #[must_use]
    pub fn from_user_seed(seed: u64) -> Self {
        Self {
            discovery: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"discovery"))),
            helpers: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"helpers"))),
            rewards: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"rewards"))),
            policy: RefCell::new(CountingRng::new(derive_stream_seed(seed, b"policy"))),
        }
    }

    /// Helper discovery rolls.
    #[must_use]
    pub fn discovery(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.discovery.borrow_mut()
    }

    /// Helper automation gates.
    #[must_use]
    pub fn helpers(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.helpers.borrow_mut()
    }

    /// Adventure and mining drop rolls.
    #[must_use]
    pub fn rewards(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.rewards.borrow_mut()
    }

    /// Player session triggers and decisions.
    #[must_use]
    pub fn policy(&self) -> RefMut<'_, CountingRng<SmallRng>> {
        self.policy.borrow_mut()
    }

    /// Total draws across every stream.
    #[must_use]
    pub fn total_draws(&self) -> u64 {
        [
            self.discovery.borrow().draws(),
            self.helpers.borrow().draws(),
            self.rewards.borrow().draws(),
            self.policy.borrow().draws(),
        ]
        .iter()
        .fold(0_u64, |acc, draws| acc.saturating_add(*draws))
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<SmallRng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

/// Bernoulli gate. Always consumes one draw so stream positions stay aligned
/// regardless of the probability passed in.
pub fn roll_chance<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    let roll = rng.r#gen::<f64>();
    probability.is_finite() && roll < probability
}

/// Derive an independent stream seed from a user seed and a domain tag.
///
/// HMAC-SHA256 keyed by the little-endian seed; the first eight digest bytes
/// become the stream seed.
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()) else {
        return user_seed;
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0_u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
