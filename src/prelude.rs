pub use crate::axi::{AxiAddr, AxiB, AxiBus, AxiR, AxiW, Channel, Resp};
pub use crate::burst::{split, Burst};
pub use crate::channel::{ChannelSink, ChannelSource};
pub use crate::config::{BusConfig, TbConfig};
pub use crate::master::{AxiMaster, ReadResp, WriteResp};
pub use crate::ram::{AxiRam, RamFault, RamOptions};
pub use crate::regression::{Regression, TestFactory, TestParams};
pub use crate::sim::Sim;
pub use crate::stall::{cycle_pause, PauseGenerator, StallPattern};
pub use crate::tb::AxiPimTb;
pub use crate::testbench::{ChannelMonitor, Scoreboard, WriteBurstMonitor};
pub use crate::utils::clock_cycles;
pub use crate::{JoinHandle, ProtocolError, Signal, TbError, TbObj, TbResult};
pub use futures::future::FutureExt;
