//! Test execution.
//!
//! Steps within a test run strictly in order, since later steps may depend
//! on earlier side effects. Distinct tests share no mutable state, so
//! [`Runner::run_all`] runs them in parallel on a rayon pool, each with its
//! own [`ExecutionContext`].

use rayon::prelude::*;
use tracing::{debug, info, warn};

use storyrun_core::context::ExecutionContext;
use storyrun_core::error::StoryError;
use storyrun_core::grammar::GrammarRegistry;
use storyrun_core::hierarchy::{Hierarchy, Test, TestState};
use storyrun_core::path::PathAddress;
use storyrun_core::resolver::ValueResolver;
use storyrun_core::step::StepState;

use crate::config::RunConfig;
use crate::output::{RunSummary, TestSummary};

/// Executes tests against a grammar registry.
///
/// Finders and grammars must be registered before the runner is built;
/// the runner only reads them.
#[derive(Debug)]
pub struct Runner {
    registry: GrammarRegistry,
    resolver: ValueResolver,
    workers: usize,
    stop_on_exception: bool,
}

impl Runner {
    /// Create a runner with one worker that runs every step.
    pub fn new(registry: GrammarRegistry, resolver: ValueResolver) -> Self {
        Runner {
            registry,
            resolver,
            workers: 1,
            stop_on_exception: false,
        }
    }

    /// Create a runner from resolved configuration.
    ///
    /// The configured date order is applied to `resolver`.
    pub fn from_config(
        config: &RunConfig,
        registry: GrammarRegistry,
        resolver: ValueResolver,
    ) -> Self {
        Runner::new(registry, resolver.with_date_order(config.date_order.value))
            .with_workers(config.workers.value)
            .with_stop_on_exception(config.stop_on_exception.value)
    }

    /// Number of worker threads for [`run_all`](Self::run_all). Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Leave the remaining steps of a test not run after a step throws.
    pub fn with_stop_on_exception(mut self, stop: bool) -> Self {
        self.stop_on_exception = stop;
        self
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &ValueResolver {
        &self.resolver
    }

    /// Run one test: reset it, execute its steps in order, record results.
    pub fn run_test(&self, test: &mut Test, ctx: &ExecutionContext) -> TestState {
        test.reset();

        for step in test.steps_mut() {
            let state = self.registry.execute(step, &self.resolver, ctx);
            if state == StepState::ExceptionThrown && self.stop_on_exception {
                debug!("stopping test after exception");
                break;
            }
        }

        test.record_results();
        let state = test.state();
        match state {
            TestState::Passed => info!(test = test.name(), "passed"),
            TestState::Failed | TestState::Errored => {
                warn!(test = test.name(), state = ?state, results = ?test.results(), "test did not pass")
            }
            TestState::NotRun => {}
        }
        state
    }

    /// Run every test in `hierarchy` in parallel.
    ///
    /// `make_context` is called once per test with the test's address. The
    /// summary lists tests in depth-first insertion order.
    pub fn run_all<F>(&self, hierarchy: &mut Hierarchy, make_context: F) -> Result<RunSummary, StoryError>
    where
        F: Fn(&PathAddress) -> ExecutionContext + Send + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| StoryError::internal(format!("failed to start worker pool: {}", e)))?;

        let paths: Vec<PathAddress> = hierarchy.tests_with_paths().map(|(path, _)| path).collect();
        let tests = hierarchy.tests_mut();
        info!(tests = tests.len(), workers = self.workers, "running tests");

        let summaries: Vec<TestSummary> = pool.install(|| {
            tests
                .into_par_iter()
                .zip(paths)
                .map(|(test, path)| {
                    let ctx = make_context(&path);
                    self.run_test(test, &ctx);
                    TestSummary::from_test(path, test)
                })
                .collect()
        });

        Ok(RunSummary::new(summaries))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use storyrun_core::grammar::{ActionError, FnAction, Grammar};
    use storyrun_core::step::Step;

    #[derive(Debug, Default)]
    struct Counter {
        value: AtomicUsize,
    }

    fn registry(resolver: &ValueResolver) -> GrammarRegistry {
        let mut registry = GrammarRegistry::new();
        registry
            .register(
                Grammar::new(
                    "Increment",
                    FnAction::builder("Increment the counter")
                        .returns::<i64>("value")
                        .build(|_, ctx| {
                            let counter = ctx
                                .service::<Counter>()
                                .ok_or_else(|| ActionError::failed("no counter"))?;
                            Ok(counter.value.fetch_add(1, Ordering::SeqCst) as i64 + 1)
                        }),
                ),
                resolver,
            )
            .unwrap();
        registry
            .register(
                Grammar::new(
                    "Explode",
                    FnAction::builder("Always fails")
                        .build(|_, _| Err::<(), _>(ActionError::failed("boom"))),
                ),
                resolver,
            )
            .unwrap();
        registry
    }

    fn runner() -> Runner {
        let resolver = ValueResolver::new();
        Runner::new(registry(&resolver), resolver)
    }

    fn counter_context() -> ExecutionContext {
        ExecutionContext::new().with_service(Counter::default())
    }

    fn test_with(steps: Vec<Step>) -> Test {
        let mut test = Test::new("t");
        for step in steps {
            test.add_step(step);
        }
        test
    }

    mod run_test {
        use super::*;

        #[test]
        fn steps_run_in_order_and_share_context() {
            let mut test = test_with(vec![
                Step::new("Increment").with_output("value", "1"),
                Step::new("Increment").with_output("value", "2"),
                Step::new("Increment").with_output("value", "3"),
            ]);
            let state = runner().run_test(&mut test, &counter_context());
            assert_eq!(state, TestState::Passed);
            assert_eq!(test.results().passed, 3);
        }

        #[test]
        fn failures_do_not_stop_later_steps() {
            let mut test = test_with(vec![
                Step::new("Explode"),
                Step::new("Increment").with_output("value", "9"),
                Step::new("Increment").with_output("value", "2"),
            ]);
            let state = runner().run_test(&mut test, &counter_context());
            assert_eq!(state, TestState::Errored);
            let results = test.results();
            assert_eq!((results.passed, results.failed, results.errors), (1, 1, 1));
            assert_eq!(results.exceptions, ["action failed: boom"]);
        }

        #[test]
        fn stop_on_exception_leaves_remaining_steps_not_run() {
            let runner = runner().with_stop_on_exception(true);
            let mut test = test_with(vec![
                Step::new("Increment").with_output("value", "1"),
                Step::new("Explode"),
                Step::new("Increment").with_output("value", "2"),
            ]);
            runner.run_test(&mut test, &counter_context());
            let states: Vec<StepState> = test.steps().iter().map(|s| s.state()).collect();
            assert_eq!(
                states,
                [StepState::Passed, StepState::ExceptionThrown, StepState::NotRun]
            );
        }

        #[test]
        fn rerun_starts_from_clean_results() {
            let runner = runner();
            let ctx = counter_context();
            let mut test = test_with(vec![Step::new("Increment").with_output("value", "1")]);
            assert_eq!(runner.run_test(&mut test, &ctx), TestState::Passed);
            assert_eq!(runner.run_test(&mut test, &ctx), TestState::Failed);
            assert_eq!(test.results().passed, 0);
            assert_eq!(test.steps()[0].actual(), Some("2"));
        }

        #[test]
        fn cancelled_context_errors_every_step() {
            let ctx = counter_context();
            ctx.cancel();
            let mut test = test_with(vec![
                Step::new("Increment").with_output("value", "1"),
                Step::new("Increment").with_output("value", "2"),
            ]);
            assert_eq!(runner().run_test(&mut test, &ctx), TestState::Errored);
            assert_eq!(test.results().errors, 2);
            assert_eq!(ctx.service::<Counter>().unwrap().value.load(Ordering::SeqCst), 0);
        }
    }

    mod run_all {
        use super::*;

        fn hierarchy(count: usize) -> Hierarchy {
            let mut hierarchy = Hierarchy::new();
            for i in 0..count {
                let test = hierarchy.add_test(&format!("suite{}/test{}", i % 3, i)).unwrap();
                test.add_step(Step::new("Increment").with_output("value", "1"));
                test.add_step(Step::new("Increment").with_output("value", "2"));
            }
            hierarchy
        }

        #[test]
        fn each_test_gets_its_own_context() {
            let runner = runner().with_workers(4);
            let mut hierarchy = hierarchy(12);
            let created = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&created);

            let summary = runner
                .run_all(&mut hierarchy, move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    counter_context()
                })
                .unwrap();

            assert_eq!(created.load(Ordering::SeqCst), 12);
            assert_eq!(summary.totals.tests, 12);
            assert!(summary.all_passed());
        }

        #[test]
        fn summary_follows_hierarchy_order() {
            let runner = runner().with_workers(3);
            let mut hierarchy = hierarchy(7);
            let expected: Vec<String> = hierarchy
                .tests_with_paths()
                .map(|(path, _)| path.to_string())
                .collect();

            let summary = runner.run_all(&mut hierarchy, |_| counter_context()).unwrap();
            let actual: Vec<String> = summary.tests.iter().map(|t| t.path.to_string()).collect();
            assert_eq!(actual, expected);
            assert_eq!(actual[0], "suite0/test0");
            assert_eq!(actual[1], "suite0/test3");
        }

        #[test]
        fn results_are_left_on_the_hierarchy() {
            let runner = runner();
            let mut hierarchy = hierarchy(2);
            runner.run_all(&mut hierarchy, |_| counter_context()).unwrap();
            assert!(hierarchy.all_tests().all(|t| t.state() == TestState::Passed));

            hierarchy.clear_results();
            assert!(hierarchy.all_tests().all(|t| t.state() == TestState::NotRun));
        }

        #[test]
        fn config_drives_runner_settings() {
            let config = RunConfig::resolve_with_env(
                None,
                |_| None,
                &crate::config::Overrides {
                    workers: Some(2),
                    stop_on_exception: Some(true),
                    date_order: Some(storyrun_core::dates::DateOrder::DayFirst),
                    ..Default::default()
                },
            )
            .unwrap();
            let resolver = ValueResolver::new();
            let runner = Runner::from_config(&config, registry(&resolver), resolver);
            assert_eq!(runner.workers, 2);
            assert!(runner.stop_on_exception);
            assert_eq!(
                runner.resolver().date_order(),
                storyrun_core::dates::DateOrder::DayFirst
            );
        }
    }
}
