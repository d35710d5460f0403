use anyhow::{Context, Result, bail};
use rand::RngCore;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Seed used when no seed tokens are given.
pub const DEFAULT_SEED: u64 = 1337;

/// Upper bound on seeds a single range may expand to.
const MAX_RANGE_LEN: u64 = 100_000;

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d+)\.\.(=?)(\d+)$").ok())
        .as_ref()
}

/// Resolve CLI seed tokens into a de-duplicated, ordered seed list.
///
/// Accepts literal integers (negative values fold to their magnitude),
/// `a..b` half-open ranges and `a..=b` inclusive ranges.
///
/// # Errors
///
/// Fails on tokens that are neither integers nor ranges, on reversed ranges,
/// and on ranges longer than the expansion limit.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seen = BTreeSet::new();
    let mut seeds = Vec::new();
    let mut push = |seed: u64| {
        if seen.insert(seed) {
            seeds.push(seed);
        }
    };

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Ok(value) = token.parse::<i64>() {
            push(value.unsigned_abs());
            continue;
        }

        if let Ok(value) = token.parse::<u64>() {
            push(value);
            continue;
        }

        if let Some(caps) = range_pattern().and_then(|re| re.captures(token)) {
            let start: u64 = caps[1]
                .parse()
                .with_context(|| format!("range start out of bounds: {token}"))?;
            let end: u64 = caps[3]
                .parse()
                .with_context(|| format!("range end out of bounds: {token}"))?;
            let inclusive = !caps[2].is_empty();
            let end = if inclusive { end.saturating_add(1) } else { end };
            if end < start {
                bail!("Seed range runs backwards: {token}");
            }
            if end - start > MAX_RANGE_LEN {
                bail!("Seed range {token} expands to more than {MAX_RANGE_LEN} seeds");
            }
            (start..end).for_each(&mut push);
            continue;
        }

        bail!("Unrecognized seed token: {token}");
    }

    if seeds.is_empty() {
        seeds.push(DEFAULT_SEED);
    }
    Ok(seeds)
}

/// Draw `count` distinct seeds, for sweeps that should not reuse a fixed list.
pub fn random_seeds(count: usize, rng: &mut impl RngCore) -> Vec<u64> {
    let mut seen = BTreeSet::new();
    let mut seeds = Vec::with_capacity(count);
    while seeds.len() < count {
        let seed = rng.next_u64();
        if seen.insert(seed) {
            seeds.push(seed);
        }
    }
    seeds
}
