use std::future::Future;

use axi_pim_tb::prelude::*;
use axi_pim_tb::regression::TestFn;
use axi_pim_tb::tb::{test_read, test_write};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bus(data_width: u32) -> BusConfig {
    BusConfig::new(data_width, 16, 8).unwrap()
}

/// Runs `body` against a freshly reset testbench and returns the simulated
/// cycle count.
fn run_tb<F, Fut>(cfg: BusConfig, setup: impl FnOnce(&AxiPimTb), body: F) -> TbResult<u64>
where
    F: FnOnce(AxiPimTb) -> Fut,
    Fut: Future<Output = TbResult<()>> + Send + 'static,
{
    init_logger();
    let sim = Sim::new(500_000);
    let tb = AxiPimTb::new(&sim, cfg);
    setup(&tb);
    let test = body(tb.clone());
    sim.run("integration", async move {
        tb.reset().await;
        test.await
    })
}

fn stall_options() -> Vec<(Option<PauseGenerator>, Option<PauseGenerator>)> {
    let mut options = Vec::new();
    for idle in [None, Some(cycle_pause())] {
        for backpressure in [None, Some(cycle_pause())] {
            options.push((idle.clone(), backpressure));
        }
    }
    options
}

#[test]
fn three_bytes_at_0x20_under_every_stall_combination() {
    let mut cycles = Vec::new();
    for (idle, backpressure) in stall_options() {
        let n = run_tb(
            bus(8),
            |tb| {
                tb.set_idle_generator(idle.as_ref());
                tb.set_backpressure_generator(backpressure.as_ref());
            },
            |tb| async move {
                tb.master.write(0x20, &[0x0a, 0x0b, 0x0c], None).await?;
                let read = tb.master.read(0x20, 3, None).await?;
                assert_eq!(read.data, vec![0x0a, 0x0b, 0x0c]);
                assert_eq!(read.resp, Resp::Okay);
                tb.check_handshakes()
            },
        )
        .unwrap();
        cycles.push(n);
    }
    assert!(cycles[3] > cycles[0]);
}

#[test]
fn shortest_and_longest_sweep_lengths() {
    run_tb(
        bus(32),
        |tb| tb.set_idle_generator(Some(&cycle_pause())),
        |tb| async move {
            let one = [0x5a];
            let long: Vec<u8> = (0..127u8).map(|b| b.wrapping_mul(7)).collect();
            assert_eq!(tb.round_trip(0x70, &one, None).await?, one);
            assert_eq!(tb.round_trip(0x10, &long, None).await?, long);
            tb.scoreboard.result().map(|_| ())
        },
    )
    .unwrap();
}

#[test]
fn crossing_4k_splits_and_survives_reordered_reads() {
    let cfg = bus(32);
    assert!(split(&cfg, 0x0ff0, 64, None).unwrap().len() >= 2);
    run_tb(
        cfg,
        |tb| {
            tb.ram.set_options(RamOptions {
                reorder_reads: true,
                ..RamOptions::default()
            })
        },
        |tb| async move {
            let r_ids = TbObj::new(Vec::new());
            let seen = r_ids.clone();
            let (sim, r) = (tb.sim.clone(), tb.bus.r.clone());
            tb.sim.spawn("r ids", async move {
                loop {
                    sim.rising_edge().await;
                    if let Some(beat) = r.handshake() {
                        seen.with_mut(|ids| ids.push(beat.id));
                    }
                }
            });

            let data: Vec<u8> = (0..64u8).collect();
            tb.master.write(0x0ff0, &data, None).await?;
            let read = tb.master.read(0x0ff0, data.len(), None).await?;
            assert_eq!(read.data, data);
            assert_eq!(tb.ram.read_mem(0x0ff0, 64), data);
            // let the monitors sample the final edge
            clock_cycles(&tb.sim, 2).await;
            let [aw, w, b, ar, r] = tb.beat_counts();
            assert_eq!((aw, b, ar), (2, 2, 2));
            assert_eq!(tb.checked_write_bursts(), 2);
            assert_eq!(w, 16);
            assert_eq!(r, 16);
            // the second burst was answered first
            let ids = r_ids.get().clone();
            assert_eq!(ids.len(), 16);
            assert!(ids.windows(2).any(|pair| pair[0] > pair[1]), "{:?}", ids);
            tb.check_handshakes()
        },
    )
    .unwrap();
}

#[test]
fn narrow_sizes_on_a_wide_bus() {
    for size in [Some(0), Some(1), None] {
        run_tb(
            bus(32),
            |tb| tb.set_backpressure_generator(Some(&cycle_pause())),
            move |tb| async move {
                let data: Vec<u8> = (0..21u8).map(|b| b ^ 0xa5).collect();
                assert_eq!(tb.round_trip(0x13, &data, size).await?, data);
                Ok(())
            },
        )
        .unwrap();
    }
}

#[test]
fn device_side_stalls_do_not_change_data() {
    run_tb(
        bus(16),
        |tb| {
            tb.ram.set_backpressure_generator(&PauseGenerator::random(0.5, 11));
            tb.ram.set_idle_generator(&cycle_pause());
            tb.set_idle_generator(Some(&PauseGenerator::random(0.3, 12)));
        },
        |tb| async move {
            let data: Vec<u8> = (0..90u8).collect();
            assert_eq!(tb.round_trip(0x40, &data, None).await?, data);
            tb.check_handshakes()
        },
    )
    .unwrap();
}

#[test]
fn stall_injection_costs_cycles_not_data() {
    let data: Vec<u8> = (0..100u8).map(|b| b.wrapping_mul(31)).collect();
    let mut results = Vec::new();
    let stalls = [
        None,
        Some(cycle_pause()),
        Some(PauseGenerator::random(0.4, 5)),
    ];
    for stall in stalls {
        let out = TbObj::new(Vec::new());
        let got = out.clone();
        let data = data.clone();
        let cycles = run_tb(
            bus(8),
            |tb| {
                tb.set_idle_generator(stall.as_ref());
                tb.set_backpressure_generator(stall.as_ref());
            },
            |tb| async move {
                let read = tb.round_trip(0x30, &data, None).await?;
                got.with_mut(|g| *g = read);
                Ok(())
            },
        )
        .unwrap();
        let read = out.get().clone();
        results.push((read, cycles));
    }
    assert!(results.iter().all(|(read, _)| *read == data));
    assert!(results[1].1 > results[0].1);
    assert!(results[2].1 > results[0].1);
}

#[test]
fn slverr_is_reported_after_all_bursts_drain() {
    let cfg = bus(8).with_max_burst_len(4).unwrap();
    run_tb(
        cfg,
        |tb| {
            tb.ram.set_options(RamOptions {
                error_window: Some(0x40..0x44),
                ..RamOptions::default()
            })
        },
        |tb| async move {
            let err = tb.master.write(0x38, &[0xee; 16], None).await.unwrap_err();
            assert!(matches!(
                err,
                TbError::Protocol(ProtocolError::ErrorResponse {
                    addr: 0x40,
                    resp: Resp::SlvErr,
                    ..
                })
            ));
            // every burst was acknowledged, the ones outside the window landed
            clock_cycles(&tb.sim, 2).await;
            assert_eq!(tb.beat_counts()[2], 4);
            assert_eq!(tb.ram.read_mem(0x44, 4), vec![0xee; 4]);

            let err = tb.master.read(0x40, 2, None).await.unwrap_err();
            assert!(matches!(
                err,
                TbError::Protocol(ProtocolError::ErrorResponse {
                    resp: Resp::SlvErr,
                    ..
                })
            ));

            // the bus is still usable afterwards
            assert_eq!(tb.round_trip(0x00, &[1, 2, 3], None).await?, vec![1, 2, 3]);
            Ok(())
        },
    )
    .unwrap();
}

#[test]
fn unmapped_addresses_answer_decerr() {
    let cfg = BusConfig::new(8, 17, 8).unwrap();
    let err = run_tb(
        cfg,
        |_| {},
        |tb| async move {
            tb.master.write(0xffff, &[1, 2], None).await?;
            Ok(())
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TbError::Protocol(ProtocolError::ErrorResponse {
            addr: 0x10000,
            resp: Resp::DecErr,
            ..
        })
    ));
}

fn read_with_fault(fault: RamFault, length: usize) -> TbError {
    run_tb(
        bus(8),
        |tb| {
            tb.ram.set_options(RamOptions {
                fault: Some(fault),
                ..RamOptions::default()
            })
        },
        move |tb| async move {
            tb.master.read(0, length, None).await?;
            Ok(())
        },
    )
    .unwrap_err()
}

#[test]
fn early_last_is_a_protocol_error() {
    assert!(matches!(
        read_with_fault(RamFault::EarlyLast, 4),
        TbError::Protocol(ProtocolError::EarlyLast {
            beat: 0,
            beats: 4,
            ..
        })
    ));
}

#[test]
fn missing_last_is_a_protocol_error() {
    assert!(matches!(
        read_with_fault(RamFault::MissingLast, 4),
        TbError::Protocol(ProtocolError::MissingLast { beat: 3, beats: 4, .. })
    ));
    assert!(matches!(
        read_with_fault(RamFault::MissingLast, 1),
        TbError::Protocol(ProtocolError::MissingLast { .. })
    ));
}

#[test]
fn foreign_read_id_is_a_protocol_error() {
    assert!(matches!(
        read_with_fault(RamFault::WrongReadId, 2),
        TbError::Protocol(ProtocolError::UnexpectedId { id: 0x80 })
    ));
}

#[test]
fn foreign_write_id_is_a_protocol_error() {
    let err = run_tb(
        bus(8),
        |tb| {
            tb.ram.set_options(RamOptions {
                fault: Some(RamFault::WrongWriteId),
                ..RamOptions::default()
            })
        },
        |tb| async move {
            tb.master.write(0, &[9], None).await?;
            Ok(())
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TbError::Protocol(ProtocolError::UnexpectedId { id: 0x80 })
    ));
}

#[test]
fn write_response_before_data_is_a_protocol_error() {
    let err = run_tb(
        bus(8),
        |tb| {
            tb.ram.set_options(RamOptions {
                fault: Some(RamFault::EarlyWriteResponse),
                ..RamOptions::default()
            })
        },
        |tb| async move {
            // 16 beats cannot all be taken before B comes back
            tb.master.write(0, &[0x3c; 16], None).await?;
            Ok(())
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TbError::Protocol(ProtocolError::EarlyResponse { id: 0 })
    ));
}

#[test]
fn malformed_requests_are_rejected_before_the_bus() {
    run_tb(
        bus(16),
        |_| {},
        |tb| async move {
            assert!(matches!(
                tb.master.read(0, 0, None).await,
                Err(TbError::InvalidRequest(_))
            ));
            assert!(matches!(
                tb.master.write(0, &[1, 2], Some(2)).await,
                Err(TbError::InvalidRequest(_))
            ));
            assert!(matches!(
                tb.master.write(0xffff, &[1, 2], None).await,
                Err(TbError::InvalidRequest(_))
            ));
            assert_eq!(tb.beat_counts(), [0; 5]);
            Ok(())
        },
    )
    .unwrap();
}

#[test]
fn mismatches_accumulate_over_the_sweep() {
    let err = run_tb(
        bus(8),
        |_| {},
        |tb| async move {
            for (i, addr) in [0x00u64, 0x10, 0x20, 0x30].into_iter().enumerate() {
                let data = vec![i as u8 + 1; 4];
                tb.master.write(addr, &data, None).await?;
                if i % 2 == 1 {
                    // corrupt behind the master's back
                    tb.ram.write_mem(addr + 1, &[0xff]);
                }
                let read = tb.master.read(addr, data.len(), None).await?;
                tb.scoreboard.add_exp(addr, data);
                tb.scoreboard.add_recv(addr, read.data);
            }
            tb.scoreboard.result().map(|_| ())
        },
    )
    .unwrap_err();
    match err {
        TbError::DataMismatch { mismatches, summary } => {
            assert_eq!(mismatches.len(), 2);
            assert_eq!(mismatches[0].addr, 0x10);
            assert_eq!(mismatches[0].observed, vec![2, 0xff, 2, 2]);
            assert_eq!(mismatches[1].addr, 0x30);
            assert!(summary.contains("matched=2"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn regression_sweeps_pass_for_16_bit_bus() {
    init_logger();
    let tb = TbConfig {
        max_length: 24,
        seed: 1,
        ..TbConfig::default()
    };
    let mut regression = Regression::new("axi_pim_integration");
    let sweeps: [(&str, TestFn); 2] = [("run_test_write", test_write), ("run_test_read", test_read)];
    for (name, func) in sweeps {
        regression.add(
            &TestFactory::new(name, func, bus(16), tb.clone())
                .add_idle_option(vec![None, Some(cycle_pause())])
                .add_backpressure_option(vec![None, Some(cycle_pause())])
                .add_size_option(vec![None, Some(0)]),
        );
    }
    assert_eq!(regression.len(), 16);
    assert!(regression.run());
    for test in regression.iter() {
        let outcome = test.outcome().unwrap();
        assert!(outcome.cycles > 0, "{} took no cycles", test.name);
    }
}
