use std::env;
use std::str::FromStr;

use crate::sim::DEFAULT_MAX_CYCLES;
use crate::{TbError, TbResult};

pub const MAX_BURST_LEN: usize = 256;
pub const BOUNDARY: u64 = 0x1000;

/// Bus geometry, fixed for the lifetime of a master and the device behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    data_width: u32,
    addr_width: u32,
    id_width: u32,
    max_burst_len: usize,
}

impl BusConfig {
    pub fn new(data_width: u32, addr_width: u32, id_width: u32) -> TbResult<Self> {
        if !matches!(data_width, 8 | 16 | 32) {
            return Err(TbError::Config(format!(
                "data width must be 8, 16 or 32 bits, got {}",
                data_width
            )));
        }
        if !(1..=32).contains(&addr_width) {
            return Err(TbError::Config(format!(
                "address width must be 1..=32 bits, got {}",
                addr_width
            )));
        }
        if !(1..=16).contains(&id_width) {
            return Err(TbError::Config(format!(
                "id width must be 1..=16 bits, got {}",
                id_width
            )));
        }
        Ok(Self {
            data_width,
            addr_width,
            id_width,
            max_burst_len: MAX_BURST_LEN,
        })
    }

    pub fn with_max_burst_len(mut self, max_burst_len: usize) -> TbResult<Self> {
        if !(1..=MAX_BURST_LEN).contains(&max_burst_len) {
            return Err(TbError::Config(format!(
                "max burst length must be 1..={}, got {}",
                MAX_BURST_LEN, max_burst_len
            )));
        }
        self.max_burst_len = max_burst_len;
        Ok(self)
    }

    /// Reads `PARAM_DATA_WIDTH`, `PARAM_ADDR_WIDTH` and `PARAM_ID_WIDTH`,
    /// defaulting to 8/16/8.
    pub fn from_env() -> TbResult<Self> {
        Self::new(
            env_or("PARAM_DATA_WIDTH", 8)?,
            env_or("PARAM_ADDR_WIDTH", 16)?,
            env_or("PARAM_ID_WIDTH", 8)?,
        )
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn addr_width(&self) -> u32 {
        self.addr_width
    }

    pub fn id_width(&self) -> u32 {
        self.id_width
    }

    pub fn strb_width(&self) -> u32 {
        self.data_width / 8
    }

    pub fn byte_lanes(&self) -> usize {
        self.strb_width() as usize
    }

    /// Largest transfer size, as log2 of bytes per beat.
    pub fn max_size(&self) -> u8 {
        self.byte_lanes().trailing_zeros() as u8
    }

    pub fn max_burst_len(&self) -> usize {
        self.max_burst_len
    }

    pub fn boundary(&self) -> u64 {
        BOUNDARY
    }

    /// Number of bytes addressable with `addr_width` bits.
    pub fn addr_space(&self) -> u64 {
        1u64 << self.addr_width
    }

    /// Byte lane carrying `addr`.
    pub fn lane(&self, addr: u64) -> usize {
        (addr % self.byte_lanes() as u64) as usize
    }

    pub fn id_count(&self) -> u32 {
        1u32 << self.id_width
    }

    /// Bursts a master keeps in flight at once, one distinct id each.
    pub fn max_outstanding(&self) -> usize {
        self.id_count().min(MAX_BURST_LEN as u32) as usize
    }
}

/// Sweep parameters for the write/read-back scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbConfig {
    /// Lengths 1..=max_length are exercised.
    pub max_length: usize,
    /// Addresses are drawn from 0..addr_span.
    pub addr_span: u64,
    /// Addresses are rounded down to this alignment.
    pub align: u64,
    pub seed: u64,
    pub max_cycles: u64,
}

impl Default for TbConfig {
    fn default() -> Self {
        Self {
            max_length: 127,
            addr_span: 128,
            align: 16,
            seed: 0,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

impl TbConfig {
    /// Defaults, with `RANDOM_SEED` (random when unset), `TB_MAX_LENGTH` and
    /// `TB_MAX_CYCLES` taken from the environment.
    pub fn from_env() -> TbResult<Self> {
        let defaults = Self::default();
        let seed = match env::var("RANDOM_SEED") {
            Ok(v) => parse("RANDOM_SEED", &v)?,
            Err(_) => rand::random::<u64>(),
        };
        let tb = Self {
            max_length: env_or("TB_MAX_LENGTH", defaults.max_length)?,
            max_cycles: env_or("TB_MAX_CYCLES", defaults.max_cycles)?,
            seed,
            ..defaults
        };
        if tb.max_length == 0 {
            return Err(TbError::Config("TB_MAX_LENGTH must be at least 1".into()));
        }
        Ok(tb)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> TbResult<T> {
    match env::var(key) {
        Ok(v) => parse(key, &v),
        Err(_) => Ok(default),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> TbResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TbError::Config(format!("{}={:?} is not a valid number", key, value)))
}
