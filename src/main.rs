use log::{error, info};
use std::process::ExitCode;

use axi_pim_tb::config::{BusConfig, TbConfig};
use axi_pim_tb::regression::{Regression, TestFactory, TestFn};
use axi_pim_tb::stall::cycle_pause;
use axi_pim_tb::tb::{test_pim, test_read, test_write};
use axi_pim_tb::TbResult;

const DATA_WIDTHS: [u32; 3] = [8, 16, 32];

/// Bus configurations to sweep: the one given by `PARAM_DATA_WIDTH`, or every
/// supported data width with the remaining parameters from the environment.
fn bus_configs() -> TbResult<Vec<BusConfig>> {
    let base = BusConfig::from_env()?;
    if std::env::var("PARAM_DATA_WIDTH").is_ok() {
        return Ok(vec![base]);
    }
    DATA_WIDTHS
        .iter()
        .map(|&w| {
            BusConfig::new(w, base.addr_width(), base.id_width())?
                .with_max_burst_len(base.max_burst_len())
        })
        .collect()
}

fn regression() -> TbResult<Regression> {
    let tb = TbConfig::from_env()?;
    info!("RANDOM_SEED={}", tb.seed);
    let mut regression = Regression::new("axi_pim");
    for bus in bus_configs()? {
        let sweeps: [(&str, TestFn); 2] = [
            ("run_test_write", test_write),
            ("run_test_read", test_read),
        ];
        // full width plus every narrower transfer size
        let sizes: Vec<Option<u8>> = std::iter::once(None)
            .chain((0..bus.max_size()).map(Some))
            .collect();
        for (name, func) in sweeps {
            let base = format!("{}_dw{}", name, bus.data_width());
            let factory = TestFactory::new(&base, func, bus, tb.clone())
                .add_idle_option(vec![None, Some(cycle_pause())])
                .add_backpressure_option(vec![None, Some(cycle_pause())])
                .add_size_option(sizes.clone());
            regression.add(&factory);
        }
        let base = format!("run_pim_test_dw{}", bus.data_width());
        regression.add(&TestFactory::new(&base, test_pim, bus, tb.clone()));
    }
    Ok(regression)
}

fn main() -> ExitCode {
    env_logger::init();

    let regression = match regression() {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let passed = regression.run();
    regression.summary().printstd();
    if let Err(e) = regression.write_junit("results.xml") {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    match passed {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}
