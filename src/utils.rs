use std::sync::atomic::{AtomicU64, Ordering};

use rand_distr::{LogNormal, NormalError};

/// Seed of the current scenario iteration, set by main before each run
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// Number of batch runs executed by scenarios so far
pub static TOTAL_SCENARIO_RUNS: AtomicU64 = AtomicU64::new(0);

pub fn current_seed() -> u64 {
    RAND_SEED.load(Ordering::Relaxed)
}

/// Derive a per-stream seed from an iteration seed, so independent generators do not share a sequence
pub fn seed_with(seed: u64, salt: u64) -> u64 {
    seed.wrapping_mul(1_000_003).wrapping_add(salt)
}

/// Convert mean and standard deviation to log-normal distribution parameters
/// Returns (μ, σ) for LogNormal(μ, σ) that approximates the given mean and stddev
///
/// For LogNormal(μ, σ):
/// - E[X] = exp(μ + σ²/2)
/// - Var[X] = (exp(σ²) - 1) * exp(2μ + σ²)
///
/// To convert from mean (m) and stddev (s):
/// - σ = sqrt(ln(1 + s²/m²))
/// - μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let variance = stddev * stddev;
    let sigma_squared = (1.0 + variance / (mean * mean)).ln();
    let sigma = sigma_squared.sqrt();
    let mu = mean.ln() - sigma_squared / 2.0;
    (mu, sigma)
}

/// Create a log-normal distribution from mean and standard deviation
pub fn lognormal_dist(mean: f64, stddev: f64) -> Result<LogNormal<f64>, NormalError> {
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma)
}
