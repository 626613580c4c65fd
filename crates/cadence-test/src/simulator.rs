//! Reentrancy simulator
//!
//! Generates random nesting trees of events from a seed, replays them through
//! a `ScriptedHandler`, and checks the handled order against an oracle that
//! models the ordering rule directly:
//! - a sequenced event sent while a dispatch runs joins the back of the queue
//! - a pass-through event is handled on the spot, nested inside its sender
//! - the queue drains front to back once the outermost handler returns

use std::collections::{HashMap, HashSet, VecDeque};

use cadence_core::{codes, is_sequenced, CadenceError, CadenceResult, EventCode, SEQUENCED_CODES};
use cadence_queue::SafeQueueConfig;
use cadence_runtime::RuntimeConfig;
use cadence_sequencer::SequencerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{tag_payload, ScriptedHandler, Step};

const PASS_THROUGH_CODES: [EventCode; 5] = [
    codes::MOUSE_MOVE,
    codes::LBUTTON_DOWN,
    codes::LBUTTON_UP,
    codes::TIMER,
    codes::SET_FOCUS,
];

/// Simulator configuration
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Events delivered from outside any dispatch
    pub roots: usize,
    /// Upper bound on events sent while handling one event
    pub max_children: usize,
    /// Nesting depth below a root
    pub max_depth: usize,
    /// Probability that a nested event is pass-through (0.0 - 1.0)
    pub pass_through_prob: f64,
    /// Probability of a paint request before each nested send (0.0 - 1.0)
    pub paint_prob: f64,
    /// Deferred-event queue sizing
    pub queue: SafeQueueConfig,
    /// Random seed
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            roots: 50,
            max_children: 3,
            max_depth: 3,
            pass_through_prob: 0.25,
            paint_prob: 0.1,
            queue: SafeQueueConfig::default(),
            seed: 42,
        }
    }
}

impl SimulatorConfig {
    /// Quick runs for unit tests
    pub fn light() -> Self {
        SimulatorConfig {
            roots: 10,
            max_children: 2,
            max_depth: 3,
            ..Default::default()
        }
    }

    /// Wide fan-out that forces the deferred queue to grow
    pub fn heavy() -> Self {
        SimulatorConfig {
            roots: 100,
            max_children: 6,
            max_depth: 4,
            pass_through_prob: 0.2,
            paint_prob: 0.2,
            queue: SafeQueueConfig::tight(),
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> CadenceResult<()> {
        for (name, p) in [
            ("pass_through_prob", self.pass_through_prob),
            ("paint_prob", self.paint_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(CadenceError::InvalidConfig(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, p
                )));
            }
        }
        self.queue.validate()
    }
}

/// Outcome of one simulation run
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    pub events_sent: usize,
    pub expected: Vec<u32>,
    pub actual: Vec<u32>,
    /// Positions where the handled order differs from the oracle
    pub ordering_violations: usize,
    pub duplicates: usize,
    pub missing: usize,
    pub invalidations: u32,
    pub expected_invalidations: u32,
    pub max_queue_depth: usize,
    pub queue_growths: u64,
    /// Flag still held or events still queued after the run
    pub left_dirty: bool,
}

impl SimulationResult {
    pub fn is_valid(&self) -> bool {
        self.ordering_violations == 0
            && self.duplicates == 0
            && self.missing == 0
            && self.invalidations == self.expected_invalidations
            && !self.left_dirty
    }
}

/// Seeded driver for random reentrant event trees
pub struct ReentrancySimulator {
    config: SimulatorConfig,
    rng: StdRng,
    next_tag: u32,
    roots: Vec<(EventCode, u32)>,
    script: HashMap<u32, Vec<Step>>,
}

impl ReentrancySimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        ReentrancySimulator {
            config,
            rng,
            next_tag: 1,
            roots: Vec::new(),
            script: HashMap::new(),
        }
    }

    fn fresh_tag(&mut self) -> u32 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    fn sequenced_code(&mut self) -> EventCode {
        SEQUENCED_CODES[self.rng.gen_range(0..SEQUENCED_CODES.len())]
    }

    fn pass_through_code(&mut self) -> EventCode {
        PASS_THROUGH_CODES[self.rng.gen_range(0..PASS_THROUGH_CODES.len())]
    }

    /// Build the event forest
    pub fn generate(&mut self) {
        for _ in 0..self.config.roots {
            let code = self.sequenced_code();
            let tag = self.fresh_tag();
            self.roots.push((code, tag));
            self.grow(tag, 1);
        }
    }

    fn grow(&mut self, parent: u32, depth: usize) {
        if depth > self.config.max_depth {
            return;
        }
        let count = self.rng.gen_range(0..=self.config.max_children);
        let mut steps = Vec::with_capacity(count);
        for _ in 0..count {
            if self.rng.gen_bool(self.config.paint_prob) {
                steps.push(Step::Paint);
            }
            let tag = self.fresh_tag();
            let code = if self.rng.gen_bool(self.config.pass_through_prob) {
                self.pass_through_code()
            } else {
                self.sequenced_code()
            };
            steps.push(Step::Send { code, tag });
            self.grow(tag, depth + 1);
        }
        if !steps.is_empty() {
            self.script.insert(parent, steps);
        }
    }

    /// Expected handled order and whether any paint was requested
    pub fn oracle(&self) -> (Vec<u32>, bool) {
        let mut order = Vec::new();
        let mut painted = false;
        for (_, root) in &self.roots {
            let mut queue = VecDeque::new();
            self.visit(*root, &mut queue, &mut order, &mut painted);
            while let Some(next) = queue.pop_front() {
                self.visit(next, &mut queue, &mut order, &mut painted);
            }
        }
        (order, painted)
    }

    fn visit(&self, tag: u32, queue: &mut VecDeque<u32>, order: &mut Vec<u32>, painted: &mut bool) {
        order.push(tag);
        let Some(steps) = self.script.get(&tag) else {
            return;
        };
        for step in steps {
            match step {
                Step::Send { code, tag } if is_sequenced(*code) => queue.push_back(*tag),
                Step::Send { tag, .. } => self.visit(*tag, queue, order, painted),
                Step::Paint => *painted = true,
                Step::Fail => {}
            }
        }
    }

    /// Generate, replay and compare
    pub fn run(&mut self) -> CadenceResult<SimulationResult> {
        self.config.validate()?;
        if self.roots.is_empty() {
            self.generate();
        }

        let runtime = RuntimeConfig {
            sequencer: SequencerConfig {
                queue: self.config.queue.clone(),
            },
            ..Default::default()
        };
        let bridge = ScriptedHandler::bridge(&runtime, self.script.clone())?;
        for (code, tag) in &self.roots {
            bridge.notify_event(*code, tag_payload(*tag))?;
        }

        let (expected, painted) = self.oracle();
        let actual = bridge.handler().handled_tags();

        let mut seen = HashSet::new();
        let duplicates = actual.iter().filter(|tag| !seen.insert(**tag)).count();
        let missing = expected.iter().filter(|tag| !seen.contains(*tag)).count();
        let ordering_violations = expected
            .iter()
            .zip(actual.iter())
            .filter(|(e, a)| e != a)
            .count()
            + expected.len().abs_diff(actual.len());

        let stats = bridge.sequencer_stats();
        Ok(SimulationResult {
            events_sent: expected.len(),
            expected,
            actual,
            ordering_violations,
            duplicates,
            missing,
            invalidations: bridge.handler().invalidations(),
            expected_invalidations: u32::from(painted),
            max_queue_depth: stats.max_queue_depth,
            queue_growths: bridge.sequencer().queue_stats().growths.into(),
            left_dirty: bridge.sequencer().is_in_progress() || bridge.sequencer().pending() > 0,
        })
    }
}
