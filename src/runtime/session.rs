//! Hole resolution: the session cache and the search strategies.
//!
//! A [`Session`] owns the live node of every hole it has resolved. The node keeps its
//! iteration state across runs; the Java text of each choice is cached per run so a
//! hole reached twice in one run resolves to the same choice.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
    check_feasibility, Config, Fill, GenerationStatus, HoleId, HoleSite, Itr, JattackError,
    JattackResult, LinearOracle, Node, Rand, Scope, Solver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Odometer over the holes of each run, the last hole varying fastest.
    Systematic,
    Random,
    /// Every hole walks its own choices, wrapping around when exhausted.
    Smart,
}

impl clap::ValueEnum for SearchStrategy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Systematic, Self::Random, Self::Smart]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Systematic => clap::builder::PossibleValue::new("systematic"),
            Self::Random => clap::builder::PossibleValue::new("random"),
            Self::Smart => clap::builder::PossibleValue::new("smart"),
        })
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Systematic => "systematic",
            Self::Random => "random",
            Self::Smart => "smart",
        })
    }
}

pub struct Session {
    strategy: SearchStrategy,
    rng: Rand,
    solver: Box<dyn Solver>,
    solver_aid: bool,
    n_outputs: u64,
    exhaustive: bool,
    max_repeated_trials: u64,

    ast_cache: BTreeMap<HoleId, Node>,
    str_cache: BTreeMap<HoleId, String>,
    verdicts: BTreeMap<(HoleId, String), Option<bool>>,
    never_reachable: BTreeSet<HoleId>,

    hole_vector: Vec<HoleId>,
    step_from: usize,
    explored_all: BTreeSet<HoleId>,
    past_outputs: BTreeSet<[u8; 32]>,
    exhausted: bool,

    driven: bool,
    runs: u64,
    outputs: u64,
    repeated_trials: u64,
    solver_calls: u64,
    template_exceptions: u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("strategy", &self.strategy)
            .field("seed", &self.rng.seed())
            .field("runs", &self.runs)
            .field("outputs", &self.outputs)
            .field("holes", &self.ast_cache.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(strategy: SearchStrategy, seed: u64) -> Self {
        Self {
            strategy,
            rng: Rand::new(seed),
            solver: Box::new(LinearOracle::new()),
            solver_aid: true,
            n_outputs: 1,
            exhaustive: false,
            max_repeated_trials: 100,
            ast_cache: BTreeMap::new(),
            str_cache: BTreeMap::new(),
            verdicts: BTreeMap::new(),
            never_reachable: BTreeSet::new(),
            hole_vector: Vec::new(),
            step_from: 0,
            explored_all: BTreeSet::new(),
            past_outputs: BTreeSet::new(),
            exhausted: false,
            driven: false,
            runs: 0,
            outputs: 0,
            repeated_trials: 0,
            solver_calls: 0,
            template_exceptions: 0,
        }
    }

    pub fn from_config(cfg: &Config, seed: u64) -> Self {
        let mut session = Self::new(cfg.strategy, seed);
        session.solver_aid = cfg.solver_aid;
        session.n_outputs = cfg.n_outputs;
        session.exhaustive = cfg.exhaustive;
        session.max_repeated_trials = cfg.max_repeated_trials;
        session
    }

    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_solver_aid(mut self, enabled: bool) -> Self {
        self.solver_aid = enabled;
        self
    }

    pub fn with_quota(mut self, n_outputs: u64, exhaustive: bool) -> Self {
        self.n_outputs = n_outputs;
        self.exhaustive = exhaustive;
        self
    }

    pub fn with_max_repeated_trials(mut self, n: u64) -> Self {
        self.max_repeated_trials = n;
        self
    }

    /// Resolves a reached hole and returns its node, positioned on this run's choice.
    pub fn resolve(&mut self, site: &HoleSite, scope: &dyn Scope) -> JattackResult<&Node> {
        let id = site
            .id
            .ok_or_else(|| JattackError::Template("hole reached before numbering".to_string()))?;
        if !self.driven {
            return Err(JattackError::NotDriven { hole: id });
        }
        if self.str_cache.contains_key(&id) {
            return self.node(id);
        }

        let node = self
            .ast_cache
            .entry(id)
            .or_insert_with(|| site.node.clone().with_id(id));
        node.prepare(scope)?;
        if !node.has_random_choice() {
            return Err(JattackError::NoChoice(format!("hole {id} has no choice")));
        }
        self.explore(id)?;

        let text = self.node(id)?.to_string();
        tracing::debug!(hole = id, strategy = %self.strategy, text = %text, "resolved hole");
        if site.condition && self.solver_aid {
            self.check_verdict(id, &text);
        }
        self.str_cache.insert(id, text);
        self.node(id)
    }

    fn explore(&mut self, id: HoleId) -> JattackResult<()> {
        let index = self.hole_vector.len();
        let node = self
            .ast_cache
            .get_mut(&id)
            .ok_or_else(|| JattackError::Template(format!("hole {id} is not cached")))?;
        match self.strategy {
            SearchStrategy::Systematic => {
                self.hole_vector.push(id);
                if index >= self.step_from || node.is_reset() {
                    if !node.has_next() {
                        node.reset();
                    }
                    node.next()?;
                }
                if !node.has_next() {
                    self.explored_all.insert(id);
                }
            }
            SearchStrategy::Random => {
                self.hole_vector.push(id);
                node.step_random(&mut self.rng)?;
            }
            SearchStrategy::Smart => {
                self.hole_vector.push(id);
                if !node.has_next() {
                    node.reset();
                }
                node.next()?;
                if !node.has_next() {
                    self.explored_all.insert(id);
                }
            }
        }
        Ok(())
    }

    fn check_verdict(&mut self, id: HoleId, text: &str) {
        let key = (id, text.to_string());
        if self.verdicts.contains_key(&key) {
            return;
        }
        let verdict = match self.ast_cache.get(&id) {
            Some(node) => check_feasibility(self.solver.as_mut(), node),
            None => None,
        };
        self.solver_calls += 1;
        tracing::debug!(hole = id, text, ?verdict, "feasibility");
        self.verdicts.insert(key, verdict);
    }

    /// Verdict of the hole's current choice: `Some(true)` always true,
    /// `Some(false)` always false.
    pub fn verdict_of(&self, id: HoleId) -> Option<bool> {
        let text = self.str_cache.get(&id)?;
        self.verdicts.get(&(id, text.clone())).copied().flatten()
    }

    pub fn node(&self, id: HoleId) -> JattackResult<&Node> {
        self.ast_cache
            .get(&id)
            .ok_or_else(|| JattackError::Template(format!("hole {id} was never resolved")))
    }

    pub fn text(&self, id: HoleId) -> Option<&str> {
        self.str_cache.get(&id).map(String::as_str)
    }

    /// Holes filled in the current run.
    pub fn filled(&self) -> &BTreeMap<HoleId, String> {
        &self.str_cache
    }

    /// The current run's fills, each restricted to its chosen value.
    pub fn fills(&self) -> JattackResult<Vec<Fill>> {
        self.str_cache
            .iter()
            .map(|(id, text)| {
                Ok(Fill {
                    id: *id,
                    text: text.clone(),
                    node: self.node(*id)?.freeze()?,
                    track: false,
                })
            })
            .collect()
    }

    pub fn begin_run(&mut self) {
        self.str_cache.clear();
        self.hole_vector.clear();
        self.never_reachable.clear();
        self.runs += 1;
    }

    /// Moves the systematic step boundary to the last visited hole that can still
    /// advance.
    pub fn end_run(&mut self) {
        let ast = &self.ast_cache;
        let boundary = self
            .hole_vector
            .iter()
            .rposition(|id| ast.get(id).map_or(false, |n| n.has_next()));
        match boundary {
            Some(i) => self.step_from = i,
            None if self.strategy == SearchStrategy::Systematic => self.exhausted = true,
            None => {}
        }
    }

    pub fn set_driven(&mut self, driven: bool) {
        self.driven = driven;
    }

    pub fn is_driven(&self) -> bool {
        self.driven
    }

    pub fn set_never_reachable(&mut self, holes: BTreeSet<HoleId>) {
        self.never_reachable = holes;
    }

    pub fn never_reachable(&self) -> &BTreeSet<HoleId> {
        &self.never_reachable
    }

    /// True when every hole of the template is either filled in this run or known to
    /// be unreachable.
    pub fn no_hole_remaining(&self, total_holes: usize) -> bool {
        let unreachable = self
            .never_reachable
            .iter()
            .filter(|id| !self.str_cache.contains_key(id))
            .count();
        self.str_cache.len() + unreachable >= total_holes
    }

    /// Records an emitted program. False when a non-systematic search already
    /// produced the same text; that counts as a repeated trial.
    pub fn record_output(&mut self, text: &str) -> bool {
        let fresh = self.past_outputs.insert(*blake3::hash(text.as_bytes()).as_bytes());
        if fresh || self.strategy == SearchStrategy::Systematic {
            self.outputs += 1;
            self.repeated_trials = 0;
            true
        } else {
            self.repeated_trials += 1;
            false
        }
    }

    pub fn record_failed_output(&mut self) {
        self.repeated_trials += 1;
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    pub fn note_template_exception(&mut self) {
        self.template_exceptions += 1;
    }

    pub fn is_done(&self) -> Option<GenerationStatus> {
        let counts_quota = !(self.strategy == SearchStrategy::Systematic && self.exhaustive);
        if counts_quota && self.outputs >= self.n_outputs {
            return Some(GenerationStatus::Quota);
        }
        if self.exhausted {
            return Some(GenerationStatus::Exhausted);
        }
        match self.strategy {
            SearchStrategy::Systematic => None,
            SearchStrategy::Smart
                if !self.ast_cache.is_empty()
                    && self.ast_cache.keys().all(|id| self.explored_all.contains(id)) =>
            {
                Some(GenerationStatus::Exhausted)
            }
            SearchStrategy::Random | SearchStrategy::Smart => (self.repeated_trials
                >= self.max_repeated_trials)
                .then_some(GenerationStatus::Stalled),
        }
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn outputs(&self) -> u64 {
        self.outputs
    }

    pub fn repeated_trials(&self) -> u64 {
        self.repeated_trials
    }

    pub fn solver_calls(&self) -> u64 {
        self.solver_calls
    }

    pub fn template_exceptions(&self) -> u64 {
        self.template_exceptions
    }

    pub fn explored_all(&self) -> &BTreeSet<HoleId> {
        &self.explored_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RelOp, Term, Type, Value, VarPool};

    fn site(id: HoleId, node: Node) -> HoleSite {
        HoleSite {
            id: Some(id),
            condition: false,
            node,
        }
    }

    struct Delegating;

    impl Solver for Delegating {
        fn check(&mut self, formula: &Term) -> crate::SatStatus {
            LinearOracle::new().check(formula)
        }
    }

    #[test]
    fn holes_need_a_driver() {
        let mut s = Session::new(SearchStrategy::Random, 1);
        let err = s
            .resolve(&site(1, Node::int_val(&[1])), &VarPool::new())
            .unwrap_err();
        assert!(matches!(err, JattackError::NotDriven { hole: 1 }));
    }

    #[test]
    fn resolving_twice_in_a_run_returns_the_same_choice() {
        let mut s = Session::new(SearchStrategy::Random, 42);
        s.begin_run();
        s.set_driven(true);
        let hole = site(1, Node::int_range(0, 1_000_000));
        let pool = VarPool::new();
        let first = s.resolve(&hole, &pool).unwrap().to_string();
        let second = s.resolve(&hole, &pool).unwrap().to_string();
        assert_eq!(first, second);
        assert_eq!(s.text(1), Some(first.as_str()));
    }

    #[test]
    fn systematic_walks_the_product_first_hole_slowest() {
        let mut s = Session::new(SearchStrategy::Systematic, 0).with_quota(100, true);
        let a = site(1, Node::int_val(&[1, 2, 3]));
        let b = site(2, Node::int_val(&[1, 2, 3]));
        let pool = VarPool::new();
        let mut seen = Vec::new();
        while s.is_done().is_none() {
            s.begin_run();
            s.set_driven(true);
            let x = s.resolve(&a, &pool).unwrap().to_string();
            let y = s.resolve(&b, &pool).unwrap().to_string();
            s.set_driven(false);
            seen.push(format!("{x},{y}"));
            s.end_run();
        }
        assert_eq!(
            seen,
            ["1,1", "1,2", "1,3", "2,1", "2,2", "2,3", "3,1", "3,2", "3,3"]
        );
        assert_eq!(s.is_done(), Some(GenerationStatus::Exhausted));
        assert!(s.explored_all().contains(&2));
    }

    #[test]
    fn verdicts_are_memoized_per_choice() {
        let mut s = Session::new(SearchStrategy::Systematic, 0);
        let mut cond = site(
            1,
            Node::relation(
                Node::ident(Type::Int, &["x"]),
                Node::ident(Type::Int, &["x"]),
                &[RelOp::Eq],
            ),
        );
        cond.condition = true;
        let mut pool = VarPool::new();
        pool.declare("x", Type::Int, Value::Int(3));
        for _ in 0..3 {
            s.begin_run();
            s.set_driven(true);
            s.resolve(&cond, &pool).unwrap();
            assert_eq!(s.verdict_of(1), Some(true));
            s.set_driven(false);
        }
        assert_eq!(s.solver_calls(), 1);
    }

    #[test]
    fn custom_solver_is_consulted_once_per_choice() {
        let mut s = Session::new(SearchStrategy::Random, 3).with_solver(Box::new(Delegating));
        let mut cond = site(
            1,
            Node::relation(Node::int_val(&[1]), Node::int_val(&[2]), &[RelOp::Lt]),
        );
        cond.condition = true;
        for _ in 0..4 {
            s.begin_run();
            s.set_driven(true);
            s.resolve(&cond, &VarPool::new()).unwrap();
        }
        assert_eq!(s.verdict_of(1), Some(true));
        assert_eq!(s.solver_calls(), 1);
    }

    #[test]
    fn uninferable_identifier_has_no_choice() {
        let mut s = Session::new(SearchStrategy::Random, 0);
        s.begin_run();
        s.set_driven(true);
        let err = s
            .resolve(&site(1, Node::ident(Type::Long, &[])), &VarPool::new())
            .unwrap_err();
        assert!(matches!(err, JattackError::NoChoice(_)));
    }

    #[test]
    fn duplicate_outputs_count_as_repeated_trials() {
        let mut s = Session::new(SearchStrategy::Random, 0)
            .with_quota(10, false)
            .with_max_repeated_trials(2);
        assert!(s.record_output("class A {}"));
        assert!(!s.record_output("class A {}"));
        assert!(!s.record_output("class A {}"));
        assert_eq!(s.is_done(), Some(GenerationStatus::Stalled));
    }

    #[test]
    fn smart_wraps_each_hole_independently() {
        let mut s = Session::new(SearchStrategy::Smart, 0).with_quota(100, false);
        let a = site(1, Node::int_val(&[1, 2]));
        let b = site(2, Node::int_val(&[1, 2, 3]));
        let pool = VarPool::new();
        let mut seen = Vec::new();
        while s.is_done().is_none() {
            s.begin_run();
            s.set_driven(true);
            let x = s.resolve(&a, &pool).unwrap().to_string();
            let y = s.resolve(&b, &pool).unwrap().to_string();
            seen.push(format!("{x}{y}"));
            s.end_run();
        }
        assert_eq!(seen, ["11", "22", "13"]);
        assert_eq!(s.is_done(), Some(GenerationStatus::Exhausted));
    }

    #[test]
    fn smart_is_done_right_after_the_last_choice() {
        let mut s = Session::new(SearchStrategy::Smart, 0).with_quota(100, false);
        let a = site(1, Node::int_val(&[1, 2]));
        let pool = VarPool::new();
        let mut seen = Vec::new();
        while s.is_done().is_none() {
            s.begin_run();
            s.set_driven(true);
            seen.push(s.resolve(&a, &pool).unwrap().to_string());
            s.end_run();
        }
        assert_eq!(seen, ["1", "2"]);
    }
}
