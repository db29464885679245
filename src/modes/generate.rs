//! The generation driver: runs a template, resolves the holes it reaches and emits one
//! program per run.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    assign_hole_ids, compile, eliminate_dead_code, fill_holes, gen_seed, print_class,
    rename_class, synthesize_harness, wall_time_iso_utc, Checksum, ClassRegistry,
    CompiledClass, Config, GeneratedProgram, GenerationStatus, GenerationSummary, HoleId,
    JattackError, JattackResult, SearchStrategy, Session, Stopwatch, TemplateClass,
    TemplateInfo, Value,
};

/// Per-run overrides of the loaded [`Config`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub strategy: Option<SearchStrategy>,
    pub seed: Option<u64>,
    pub n_outputs: Option<u64>,
    pub invocations: Option<u64>,
    pub exhaustive: bool,
    pub no_solver_aid: bool,
    pub no_hot_filling: bool,
    pub track_holes: bool,
    pub output_dir: Option<PathBuf>,
}

impl GenerateOptions {
    pub fn apply(&self, config: &Config) -> Config {
        let mut cfg = config.clone();
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy;
        }
        if let Some(seed) = self.seed {
            cfg.seed = Some(seed);
        }
        if let Some(n) = self.n_outputs {
            cfg.n_outputs = n;
        }
        if let Some(n) = self.invocations {
            cfg.invocations = n;
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        cfg.exhaustive |= self.exhaustive;
        cfg.solver_aid &= !self.no_solver_aid;
        cfg.hot_filling &= !self.no_hot_filling;
        cfg.track_holes |= self.track_holes;
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub summary: GenerationSummary,
    pub programs: Vec<GeneratedProgram>,
}

/// How a run ended before its output stage.
enum RunEnd {
    Completed,
    /// The static initializer or an argument method threw.
    Aborted,
}

struct Generator<'c> {
    cfg: &'c Config,
    template: TemplateClass,
    info: TemplateInfo,
    original: CompiledClass,
    registry: ClassRegistry,
    session: Session,
    /// Every hole resolved in any run.
    filled_ever: BTreeSet<HoleId>,
    programs: Vec<GeneratedProgram>,
}

/// Generates programs from `template` until the session is done.
pub fn generate(
    config: &Config,
    template: &TemplateClass,
    opt: &GenerateOptions,
) -> JattackResult<GenerationResult> {
    let cfg = opt.apply(config);
    if cfg.invocations == 0 {
        return Err(JattackError::Config("invocations must be at least 1".to_string()));
    }
    let seed = cfg.seed.unwrap_or_else(gen_seed);
    let run_id = Uuid::new_v4().to_string();
    let clock = Stopwatch::start();

    let mut generator = Generator::new(&cfg, template, seed)?;
    let status = generator.run_all()?;

    let summary = GenerationSummary {
        status,
        run_id,
        template: generator.template.name.clone(),
        seed,
        strategy: cfg.strategy,
        started_at: clock.started_at().to_string(),
        finished_at: wall_time_iso_utc(),
        duration_ms: clock.elapsed_ms(),
        runs: generator.session.runs(),
        outputs: generator.session.outputs(),
        repeated_trials: generator.session.repeated_trials(),
        total_holes: generator.info.total_holes,
        filled_holes: generator.filled_ever.len(),
        solver_calls: generator.session.solver_calls(),
        template_exceptions: generator.session.template_exceptions(),
        output_dir: cfg.output_dir.display().to_string(),
        programs: generator
            .programs
            .iter()
            .map(|p| p.name().to_string())
            .collect(),
    };
    info!(status = ?summary.status, outputs = summary.outputs, runs = summary.runs, "done");
    Ok(GenerationResult {
        summary,
        programs: generator.programs,
    })
}

impl<'c> Generator<'c> {
    fn new(cfg: &'c Config, template: &TemplateClass, seed: u64) -> JattackResult<Self> {
        let mut template = template.clone();
        template.expand_defaults(&|ty| cfg.default_literals(ty));
        let info = assign_hole_ids(&mut template)?;
        let original = compile(&template)?;
        let mut registry = ClassRegistry::new();
        registry.define(original.clone())?;
        info!(
            template = %template.name,
            holes = info.total_holes,
            strategy = %cfg.strategy,
            seed,
            "generating"
        );
        Ok(Self {
            cfg,
            session: Session::from_config(cfg, seed),
            template,
            info,
            original,
            registry,
            filled_ever: BTreeSet::new(),
            programs: Vec::new(),
        })
    }

    fn name(&self) -> String {
        self.template.name.clone()
    }

    fn run_all(&mut self) -> JattackResult<GenerationStatus> {
        loop {
            if let Some(status) = self.session.is_done() {
                return Ok(status);
            }
            self.session.begin_run();
            self.session.set_driven(true);
            let end = self.run_once();
            self.session.set_driven(false);
            match end? {
                RunEnd::Completed => self.output()?,
                RunEnd::Aborted => self.session.record_failed_output(),
            }
            let reached: Vec<HoleId> = self.session.filled().keys().copied().collect();
            if reached.is_empty() {
                // nothing to vary: the one program is all there is
                self.session.mark_exhausted();
            }
            self.filled_ever.extend(reached);
            self.session.end_run();
        }
    }

    fn run_once(&mut self) -> JattackResult<RunEnd> {
        let name = self.name();
        self.registry.define(self.original.clone())?;
        match self.registry.reset_statics(&name, Some(&mut self.session)) {
            Err(JattackError::Thrown(t)) => {
                debug!(exception = %t, "static initializer threw");
                return Ok(RunEnd::Aborted);
            }
            other => other?,
        }

        let mut args = Vec::with_capacity(self.info.arg_methods.len());
        for method in self.info.arg_methods.clone() {
            match self
                .registry
                .invoke(&name, &method, Vec::new(), Some(&mut self.session))
            {
                Ok(v) => args.push(v),
                Err(JattackError::Thrown(t)) => {
                    debug!(method = %method, exception = %t, "argument method threw");
                    return Ok(RunEnd::Aborted);
                }
                Err(e) => return Err(e),
            }
        }

        let mut hot_filling = self.cfg.hot_filling;
        let mut seen_states: HashSet<u64> = HashSet::new();
        for i in 0..self.cfg.invocations {
            if self.cfg.stop_early && !seen_states.insert(self.state_checksum(&name, &args)?) {
                debug!(invocation = i, "state repeated, stopping early");
                break;
            }
            let before = self.session.filled().len();
            match self.registry.invoke(
                &name,
                &self.info.entry,
                args.clone(),
                Some(&mut self.session),
            ) {
                Ok(_) => {}
                Err(JattackError::Thrown(t)) => {
                    debug!(invocation = i, exception = %t, "entry threw");
                }
                Err(e) => return Err(e),
            }
            if hot_filling && self.session.filled().len() > before {
                hot_filling = self.hot_fill()?;
            }
            if self.session.no_hole_remaining(self.info.total_holes) {
                debug!(invocation = i, "every hole filled or unreachable");
                break;
            }
        }
        Ok(RunEnd::Completed)
    }

    /// Checksum of the static state and the arguments, which is everything the next
    /// entry invocation can observe.
    fn state_checksum(&self, name: &str, args: &[Value]) -> JattackResult<u64> {
        let mut cs = Checksum::ignoring(&self.cfg.ignored_types);
        for v in self.registry.statics(name)? {
            cs.update(v);
        }
        for v in args {
            cs.update(v);
        }
        Ok(cs.value())
    }

    /// Redefines the running class with the fills known so far. Returns whether hot
    /// filling stays enabled for the run.
    fn hot_fill(&mut self) -> JattackResult<bool> {
        let mut class = self.template.clone();
        let dead = eliminate_dead_code(&mut class, &self.session)?;
        self.session.set_never_reachable(dead);
        fill_holes(&mut class, &self.session.fills()?, false)?;
        match compile(&class) {
            Ok(compiled) => {
                self.registry.define(compiled)?;
                Ok(true)
            }
            Err(JattackError::Compilation { diagnostics, .. }) => {
                warn!(
                    class = %class.name,
                    errors = ?diagnostics,
                    "hot filling disabled for this run"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn output(&mut self) -> JattackResult<()> {
        let mut class = self.template.clone();
        let dead = eliminate_dead_code(&mut class, &self.session)?;
        self.session.set_never_reachable(dead);
        fill_holes(&mut class, &self.session.fills()?, self.cfg.track_holes)?;
        let harness = synthesize_harness(
            &mut class,
            &self.info,
            self.cfg.invocations,
            &self.cfg.ignored_types,
            self.cfg.track_holes,
        )?;

        if let Err(err) = compile(&class) {
            match err {
                JattackError::Compilation { diagnostics, .. } if !self.cfg.allow_non_compilable => {
                    warn!(errors = ?diagnostics, "generated program does not compile");
                    self.session.record_failed_output();
                    return Ok(());
                }
                JattackError::Compilation { .. } => {}
                other => return Err(other),
            }
        }

        // duplicates are judged before the name makes every program unique
        let text = print_class(&class, Some(&harness));
        let index = self.session.outputs();
        if !self.session.record_output(&text) {
            debug!("duplicate program skipped");
            return Ok(());
        }
        let name = format!("{}{}{}", self.template.name, self.cfg.output_postfix, index);
        rename_class(&mut class, &name)?;
        let program = GeneratedProgram { class, harness };
        let path = program.save(&self.cfg.output_dir)?;
        info!(
            program = %name,
            path = %path.display(),
            filled = program.harness.filled_holes,
            "generated"
        );
        self.programs.push(program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, MethodDecl, MethodRole, Node, Stmt, Type};

    fn template(body: Vec<Stmt>) -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: Vec::new(),
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: Vec::new(),
                ret: Type::Int,
                role: MethodRole::Entry,
                body,
            }],
        }
    }

    fn counting_template() -> TemplateClass {
        let mut class = template(vec![
            Stmt::assign(
                "calls",
                Expr::binary(
                    crate::Operator::Ari(crate::AriOp::Add),
                    Expr::var("calls"),
                    Expr::int(1),
                ),
            ),
            Stmt::ret(Some(Expr::hole(Node::int_val(&[4])))),
        ]);
        class.fields.push(crate::FieldDecl {
            name: "calls".to_string(),
            ty: Type::Int,
            is_final: false,
            init: Some(Expr::int(0)),
        });
        class
    }

    fn config(tag: &str) -> Config {
        Config {
            output_dir: std::env::temp_dir().join(format!("jattack-{tag}-{}", Uuid::new_v4())),
            invocations: 3,
            ..Config::default()
        }
    }

    #[test]
    fn options_override_config() {
        let cfg = Config::default();
        let opt = GenerateOptions {
            strategy: Some(SearchStrategy::Smart),
            n_outputs: Some(7),
            no_solver_aid: true,
            track_holes: true,
            ..GenerateOptions::default()
        };
        let applied = opt.apply(&cfg);
        assert_eq!(applied.strategy, SearchStrategy::Smart);
        assert_eq!(applied.n_outputs, 7);
        assert!(!applied.solver_aid);
        assert!(applied.hot_filling);
        assert!(applied.track_holes);
    }

    #[test]
    fn templates_without_holes_produce_one_program() {
        let cfg = config("noholes");
        let result = generate(
            &cfg,
            &template(vec![Stmt::ret(Some(Expr::int(1)))]),
            &GenerateOptions {
                seed: Some(1),
                n_outputs: Some(5),
                ..GenerateOptions::default()
            },
        )
        .unwrap();
        assert_eq!(result.summary.status, GenerationStatus::Exhausted);
        assert_eq!(result.programs.len(), 1);
        assert_eq!(result.programs[0].name(), "TGen0");
        let _ = std::fs::remove_dir_all(&cfg.output_dir);
    }

    #[test]
    fn random_search_stalls_on_a_single_choice() {
        let cfg = Config {
            max_repeated_trials: 3,
            ..config("stall")
        };
        let result = generate(
            &cfg,
            &template(vec![Stmt::ret(Some(Expr::hole(Node::int_val(&[4]))))]),
            &GenerateOptions {
                strategy: Some(SearchStrategy::Random),
                seed: Some(9),
                n_outputs: Some(10),
                ..GenerateOptions::default()
            },
        )
        .unwrap();
        assert_eq!(result.summary.status, GenerationStatus::Stalled);
        assert_eq!(result.programs.len(), 1);
        assert_eq!(result.summary.repeated_trials, 3);
        let _ = std::fs::remove_dir_all(&cfg.output_dir);
    }

    #[test]
    fn runs_stop_once_every_hole_is_filled() {
        for hot_filling in [true, false] {
            let cfg = Config {
                invocations: 1000,
                hot_filling,
                ..config("nohole")
            };
            let mut generator = Generator::new(&cfg, &counting_template(), 3).unwrap();
            generator.session.begin_run();
            generator.session.set_driven(true);
            assert!(matches!(generator.run_once().unwrap(), RunEnd::Completed));
            generator.session.set_driven(false);
            let calls = generator.registry.statics("T").unwrap()[0].clone();
            assert!(matches!(calls, Value::Int(1)), "entry ran {calls:?} times");
        }
    }
}
