//! Domain setup: initial particle placement

use kernel::{DomainGeometry, Particle, ParticleStore};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

/// Place `n` particles on a shuffled lattice inside a square of side `side`.
///
/// Lattice has `sx = ceil(sqrt(n))` columns and `ceil(n / sx)` rows, inset
/// from the walls by one lattice spacing. Lattice slots are shuffled so that
/// index order carries no spatial locality. Velocities are uniform in
/// `[-1, 1)` on each axis.
pub fn init_particles<R: Rng + ?Sized>(n: usize, side: f64, rng: &mut R) -> ParticleStore {
    let sx = (n as f64).sqrt().ceil().max(1.0) as usize;
    let sy = n.div_ceil(sx);

    let mut slots: Vec<usize> = (0..n).collect();
    slots.shuffle(rng);

    let mut store = ParticleStore::with_capacity(n);
    for k in slots {
        let x = side * (1 + k % sx) as f64 / (1 + sx) as f64;
        let y = side * (1 + k / sx) as f64 / (1 + sy) as f64;
        let vx = rng.gen::<f64>() * 2.0 - 1.0;
        let vy = rng.gen::<f64>() * 2.0 - 1.0;
        store.push(Particle::at(x, y).with_velocity(vx, vy));
    }
    store
}

/// Seeded placement for `geometry`; draws a seed from entropy when `seed` is `None`.
pub fn seeded_particles(n: usize, geometry: &DomainGeometry, seed: Option<u64>) -> ParticleStore {
    let seed = seed.unwrap_or_else(rand::random);
    tracing::debug!("Initial placement seed: {}", seed);
    let mut rng = ChaChaRng::seed_from_u64(seed);
    init_particles(n, geometry.side(), &mut rng)
}
