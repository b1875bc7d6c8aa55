//! Blend-order sorting.
//!
//! Each particle gets a 32-bit composite key: quantized relative lifetime in
//! the high half, its pre-sort array index in the low half. The index column
//! breaks ties, so an unstable sort still yields a deterministic order.

use crate::instance::{Emitter, SortKey};

/// Quantization ceiling and divisor for the lifetime half of the key.
const LIFE_TIME_QUANTIZATION: f32 = 65535.0;

pub(crate) fn generate_keys(emitter: &mut Emitter, max_particle_life_time: f32) {
    let range = 1.0 / max_particle_life_time;
    for (index, particle) in emitter.particles.iter_mut().enumerate() {
        let life_time = (1.0 - particle.time_left * range) * LIFE_TIME_QUANTIZATION;
        let life_time = life_time.clamp(0.0, LIFE_TIME_QUANTIZATION) as u16;
        particle.sort_key = SortKey::new(life_time, index as u16);
    }
}

pub(crate) fn sort_particles(emitter: &mut Emitter) {
    emitter
        .particles
        .sort_unstable_by_key(|particle| particle.sort_key);
}
