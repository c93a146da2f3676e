use rand::{rngs::StdRng, Rng};

use crate::sim::Sim;

pub async fn clock_cycles(sim: &Sim, n_cycles: u32) {
    for _ in 0..n_cycles {
        sim.rising_edge().await;
    }
}

#[inline]
pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen::<u8>()).collect()
}

/// Random address below `span`, rounded down to a multiple of `align`.
#[inline]
pub fn random_aligned_addr(rng: &mut StdRng, span: u64, align: u64) -> u64 {
    let align = align.max(1);
    rng.gen_range(0..span.max(1)) & !(align - 1)
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
