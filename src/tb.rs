//! Testbench top: master, device model, monitors and scoreboard on one bus,
//! plus the write/read-back sweeps run by the regression.

use futures::future::{BoxFuture, FutureExt};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use crate::axi::{AxiAddr, AxiB, AxiBus, AxiR, AxiW};
use crate::config::{BusConfig, TbConfig};
use crate::error::ProtocolError;
use crate::master::AxiMaster;
use crate::ram::AxiRam;
use crate::regression::TestParams;
use crate::sim::Sim;
use crate::stall::PauseGenerator;
use crate::testbench::{ChannelMonitor, Scoreboard, WriteBurstMonitor};
use crate::utils::{self, clock_cycles, hex};
use crate::TbResult;

/// Upper bound on the modelled device memory; wider address spaces decode
/// the rest as DECERR.
pub const RAM_SIZE: usize = 0x1_0000;

#[derive(Clone)]
struct BusMonitors {
    aw: ChannelMonitor<AxiAddr>,
    w: ChannelMonitor<AxiW>,
    b: ChannelMonitor<AxiB>,
    ar: ChannelMonitor<AxiAddr>,
    r: ChannelMonitor<AxiR>,
    bursts: WriteBurstMonitor,
}

impl BusMonitors {
    fn new(sim: &Sim, bus: &AxiBus) -> Self {
        Self {
            aw: ChannelMonitor::new(sim, bus.aw.clone(), bus.rst.clone()),
            w: ChannelMonitor::new(sim, bus.w.clone(), bus.rst.clone()),
            b: ChannelMonitor::new(sim, bus.b.clone(), bus.rst.clone()),
            ar: ChannelMonitor::new(sim, bus.ar.clone(), bus.rst.clone()),
            r: ChannelMonitor::new(sim, bus.r.clone(), bus.rst.clone()),
            bursts: WriteBurstMonitor::new(sim, bus.aw.clone(), bus.w.clone(), bus.rst.clone()),
        }
    }
}

#[derive(Clone)]
pub struct AxiPimTb {
    pub sim: Sim,
    pub cfg: BusConfig,
    pub bus: AxiBus,
    pub master: AxiMaster,
    pub ram: AxiRam,
    pub scoreboard: Scoreboard,
    monitors: BusMonitors,
}

impl AxiPimTb {
    pub fn new(sim: &Sim, cfg: BusConfig) -> Self {
        let bus = AxiBus::new(sim, "s_axi");
        let ram_size = cfg.addr_space().min(RAM_SIZE as u64) as usize;
        Self {
            sim: sim.clone(),
            cfg,
            master: AxiMaster::new(sim, cfg, &bus),
            ram: AxiRam::new(sim, cfg, &bus, ram_size),
            scoreboard: Scoreboard::new(),
            monitors: BusMonitors::new(sim, &bus),
            bus,
        }
    }

    /// Master-side valid stalls. `None` leaves the channels as they are.
    pub fn set_idle_generator(&self, generator: Option<&PauseGenerator>) {
        if let Some(generator) = generator {
            self.master.set_idle_generator(generator);
        }
    }

    /// Master-side ready stalls. `None` leaves the channels as they are.
    pub fn set_backpressure_generator(&self, generator: Option<&PauseGenerator>) {
        if let Some(generator) = generator {
            self.master.set_backpressure_generator(generator);
        }
    }

    pub async fn reset(&self) {
        self.bus.rst.set(true);
        clock_cycles(&self.sim, 4).await;
        self.bus.rst.set(false);
        clock_cycles(&self.sim, 2).await;
    }

    /// First handshake or write beat-count violation any monitor has seen.
    pub fn check_handshakes(&self) -> TbResult<()> {
        self.monitors.bursts.check()?;
        self.monitors.aw.check()?;
        self.monitors.w.check()?;
        self.monitors.b.check()?;
        self.monitors.ar.check()?;
        self.monitors.r.check()
    }

    /// Write bursts whose W beat count has been checked against AW.
    pub fn checked_write_bursts(&self) -> u64 {
        self.monitors.bursts.bursts()
    }

    /// Beats seen on AW, W, B, AR and R.
    pub fn beat_counts(&self) -> [u64; 5] {
        [
            self.monitors.aw.beats(),
            self.monitors.w.beats(),
            self.monitors.b.beats(),
            self.monitors.ar.beats(),
            self.monitors.r.beats(),
        ]
    }

    /// Writes over the bus, reads back over the bus, and hands both to the
    /// scoreboard.
    pub async fn round_trip(&self, addr: u64, data: &[u8], size: Option<u8>) -> TbResult<Vec<u8>> {
        self.master.write(addr, data, size).await?;
        let read = self.master.read(addr, data.len(), size).await?;
        info!(
            "[{}] address: {:#x}, written: [{}], read: [{}]",
            self.sim.cycle(),
            addr,
            hex(data),
            hex(&read.data)
        );
        self.scoreboard.add_exp(addr, data.to_vec());
        self.scoreboard.add_recv(addr, read.data.clone());
        Ok(read.data)
    }

    async fn finish(&self) -> TbResult<()> {
        clock_cycles(&self.sim, 2).await;
        self.check_handshakes()?;
        let summary = self.scoreboard.result()?;
        info!("[{}] scoreboard: {}", self.sim.cycle(), summary);
        Ok(())
    }
}

fn setup(sim: &Sim, params: &TestParams) -> (AxiPimTb, StdRng) {
    let tb = AxiPimTb::new(sim, params.bus);
    tb.set_idle_generator(params.idle_inserter.as_ref());
    tb.set_backpressure_generator(params.backpressure_inserter.as_ref());
    (tb, StdRng::seed_from_u64(params.tb.seed))
}

fn sweep_addr(rng: &mut StdRng, tb: &TbConfig) -> u64 {
    utils::random_aligned_addr(rng, tb.addr_span, tb.align)
}

/// Lengths 1..=max_length at random aligned addresses: bus write, bus read,
/// compare. The device memory is checked through the backdoor as well.
pub async fn run_test_write(sim: Sim, params: TestParams) -> TbResult<()> {
    let (tb, mut rng) = setup(&sim, &params);
    tb.reset().await;

    for length in 1..=params.tb.max_length {
        let addr = sweep_addr(&mut rng, &params.tb);
        let test_data = utils::random_bytes(&mut rng, length);
        tb.round_trip(addr, &test_data, params.size).await?;
        tb.scoreboard.add_exp(addr, test_data);
        tb.scoreboard.add_recv(addr, tb.ram.read_mem(addr, length));
    }

    tb.finish().await
}

/// Lengths 1..=max_length at random aligned addresses: the device memory is
/// preloaded through the backdoor and read over the bus.
pub async fn run_test_read(sim: Sim, params: TestParams) -> TbResult<()> {
    let (tb, mut rng) = setup(&sim, &params);
    tb.reset().await;

    for length in 1..=params.tb.max_length {
        let addr = sweep_addr(&mut rng, &params.tb);
        let test_data = utils::random_bytes(&mut rng, length);
        tb.ram.write_mem(addr, &test_data);
        let read = tb.master.read(addr, length, params.size).await?;
        info!(
            "[{}] address: {:#x}, preloaded: [{}], read: [{}]",
            sim.cycle(),
            addr,
            hex(&test_data),
            hex(&read.data)
        );
        tb.scoreboard.add_exp(addr, test_data);
        tb.scoreboard.add_recv(addr, read.data);
    }

    tb.finish().await
}

/// Brings the device out of reset and checks the bus stays quiet.
pub async fn run_pim_test(sim: Sim, params: TestParams) -> TbResult<()> {
    let (tb, _) = setup(&sim, &params);
    tb.reset().await;
    clock_cycles(&sim, 2).await;
    tb.check_handshakes()?;
    match tb.beat_counts().iter().sum::<u64>() {
        0 => Ok(()),
        n => Err(ProtocolError::HandshakeViolation {
            channel: "s_axi".into(),
            cycle: sim.cycle(),
            reason: format!("{} beats on a bus nobody drives", n),
        }
        .into()),
    }
}

pub fn test_write(sim: Sim, params: TestParams) -> BoxFuture<'static, TbResult<()>> {
    run_test_write(sim, params).boxed()
}

pub fn test_read(sim: Sim, params: TestParams) -> BoxFuture<'static, TbResult<()>> {
    run_test_read(sim, params).boxed()
}

pub fn test_pim(sim: Sim, params: TestParams) -> BoxFuture<'static, TbResult<()>> {
    run_pim_test(sim, params).boxed()
}
