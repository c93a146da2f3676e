//! Test factory and regression runner: expands option lists into named
//! tests, runs each in its own `Sim`, prints a summary and writes JUnit XML.

use futures::future::BoxFuture;
use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use log::{error, info};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::OnceCell;
use prettytable::{Cell, Row, Table};
use std::path::Path;
use std::time;

use crate::config::{BusConfig, TbConfig};
use crate::sim::Sim;
use crate::stall::PauseGenerator;
use crate::{TbError, TbResult};

/// One point of a factory's option space.
#[derive(Debug, Clone)]
pub struct TestParams {
    pub bus: BusConfig,
    pub tb: TbConfig,
    pub idle_inserter: Option<PauseGenerator>,
    pub backpressure_inserter: Option<PauseGenerator>,
    /// Transfer size (log2 bytes per beat); `None` is the full bus width.
    pub size: Option<u8>,
}

pub type TestFn = fn(Sim, TestParams) -> BoxFuture<'static, TbResult<()>>;

/// Builds the cartesian product of idle injection, backpressure injection and
/// transfer size for one test function.
pub struct TestFactory {
    name: String,
    func: TestFn,
    bus: BusConfig,
    tb: TbConfig,
    idle: Vec<Option<PauseGenerator>>,
    backpressure: Vec<Option<PauseGenerator>>,
    sizes: Vec<Option<u8>>,
}

impl TestFactory {
    pub fn new(name: &str, func: TestFn, bus: BusConfig, tb: TbConfig) -> Self {
        Self {
            name: name.to_string(),
            func,
            bus,
            tb,
            idle: vec![None],
            backpressure: vec![None],
            sizes: vec![None],
        }
    }

    pub fn add_idle_option(mut self, values: Vec<Option<PauseGenerator>>) -> Self {
        self.idle = values;
        self
    }

    pub fn add_backpressure_option(mut self, values: Vec<Option<PauseGenerator>>) -> Self {
        self.backpressure = values;
        self
    }

    pub fn add_size_option(mut self, values: Vec<Option<u8>>) -> Self {
        self.sizes = values;
        self
    }

    /// Tests named `<name>_001`, `<name>_002`, ... with the idle option
    /// varying slowest and the size fastest.
    pub fn generate_tests(&self) -> Vec<Test> {
        let mut tests = Vec::new();
        for idle in &self.idle {
            for backpressure in &self.backpressure {
                for size in &self.sizes {
                    let params = TestParams {
                        bus: self.bus,
                        tb: self.tb.clone(),
                        idle_inserter: idle.clone(),
                        backpressure_inserter: backpressure.clone(),
                        size: *size,
                    };
                    let name = format!("{}_{:03}", self.name, tests.len() + 1);
                    tests.push(Test::new(name, self.func, params));
                }
            }
        }
        tests
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub result: Result<(), String>,
    pub time_secs: f64,
    pub cycles: u64,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Test {
    pub name: String,
    pub params: TestParams,
    func: TestFn,
    outcome: OnceCell<TestOutcome>,
}

impl Test {
    pub fn new(name: String, func: TestFn, params: TestParams) -> Self {
        Self {
            name,
            params,
            func,
            outcome: OnceCell::new(),
        }
    }

    /// Runs the test once in a fresh `Sim`; later calls return the recorded
    /// outcome.
    pub fn run(&self) -> &TestOutcome {
        self.outcome.get_or_init(|| {
            info!("running {}", self.name);
            let sim = Sim::new(self.params.tb.max_cycles);
            let start = time::Instant::now();
            let result = sim.run(&self.name, (self.func)(sim.clone(), self.params.clone()));
            let time_secs = start.elapsed().as_secs_f64();
            let cycles = sim.cycle();
            match result {
                Ok(_) => {
                    info!("{} passed", self.name);
                    TestOutcome {
                        result: Ok(()),
                        time_secs,
                        cycles,
                    }
                }
                Err(e) => {
                    error!("{} failed: {}", self.name, e);
                    TestOutcome {
                        result: Err(e.to_string()),
                        time_secs,
                        cycles,
                    }
                }
            }
        })
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.outcome.get()
    }
}

/// All tests of one run, in registration order.
pub struct Regression {
    name: String,
    tests: Vec<Test>,
}

impl Regression {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add(&mut self, factory: &TestFactory) {
        self.tests.extend(factory.generate_tests());
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.tests.iter()
    }

    /// Runs every test, one after the other. True if all passed.
    pub fn run(&self) -> bool {
        let start = time::Instant::now();
        let passed = self.tests.iter().filter(|t| t.run().passed()).count();
        info!(
            "{}: {} of {} tests passed in {:.3} s",
            self.name,
            passed,
            self.tests.len(),
            start.elapsed().as_secs_f64()
        );
        passed == self.tests.len()
    }

    pub fn summary(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(vec![
            Cell::new("TEST"),
            Cell::new("RESULT"),
            Cell::new("CYCLES"),
            Cell::new("REAL TIME (s)"),
            Cell::new("CYCLES/s"),
        ]));
        for test in &self.tests {
            let Some(outcome) = test.outcome() else {
                table.add_row(Row::new(vec![
                    Cell::new(&test.name),
                    Cell::new("not run"),
                ]));
                continue;
            };
            let speed = match outcome.time_secs > 0.0 {
                true => (outcome.cycles as f64 / outcome.time_secs) as u64,
                false => 0,
            };
            table.add_row(Row::new(vec![
                Cell::new(&test.name),
                Cell::new(if outcome.passed() { "PASS" } else { "FAIL" }),
                Cell::new(&outcome.cycles.to_formatted_string(&Locale::en)),
                Cell::new(&format!("{:.3}", outcome.time_secs)),
                Cell::new(&speed.to_formatted_string(&Locale::en)),
            ]));
        }
        table
    }

    pub fn write_junit(&self, path: impl AsRef<Path>) -> TbResult<()> {
        let mut test_cases = Vec::new();
        for test in &self.tests {
            let tc = match test.outcome() {
                Some(TestOutcome {
                    result: Ok(()),
                    time_secs,
                    ..
                }) => TestCaseBuilder::success(&test.name, Duration::seconds_f64(*time_secs)),
                Some(TestOutcome {
                    result: Err(msg),
                    time_secs,
                    ..
                }) => TestCaseBuilder::failure(
                    &test.name,
                    Duration::seconds_f64(*time_secs),
                    "failure",
                    msg,
                ),
                None => TestCaseBuilder::skipped(&test.name),
            }
            .build();
            test_cases.push(tc);
        }

        let test_suite = TestSuiteBuilder::new(&self.name)
            .add_testcases(test_cases)
            .build();
        let report = ReportBuilder::new().add_testsuite(test_suite).build();
        let file = std::fs::File::create(path)?;
        report
            .write_xml(file)
            .map_err(|e| TbError::Report(e.to_string()))
    }
}
