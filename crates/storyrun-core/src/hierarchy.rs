//! The specification hierarchy: suites containing suites and tests.
//!
//! A [`Hierarchy`] owns a root [`Suite`]. Suites hold children in insertion
//! order, keyed by name; a [`Test`] is always a leaf and owns its steps and
//! last-run results. Tests are addressed by [`PathAddress`].
//!
//! ```
//! use storyrun_core::hierarchy::Hierarchy;
//!
//! let mut hierarchy = Hierarchy::new();
//! hierarchy.add_test("Accounts/Deposits/Small").unwrap();
//! hierarchy.add_test("Accounts/Deposits/Large").unwrap();
//! hierarchy.add_test("Login").unwrap();
//!
//! let names: Vec<&str> = hierarchy.all_tests().map(|t| t.name()).collect();
//! assert_eq!(names, ["Small", "Large", "Login"]);
//! ```
//!
//! Traversal is depth-first in insertion order and can be restarted freely;
//! it never mutates the tree.

use indexmap::map::{Entry, Values, ValuesMut};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::path::{PathAddress, PathError};
use crate::step::{Step, StepState};

// ============================================================================
// Error Types
// ============================================================================

/// Structural errors raised while building a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// Path text could not be parsed.
    #[error(transparent)]
    MalformedPath(#[from] PathError),

    /// A test cannot be added at the root address.
    #[error("cannot add a test at the root address")]
    RootAddress,

    /// A node with the same name already exists under the same parent.
    #[error("'{path}' already exists")]
    DuplicateNode { path: String },

    /// An intermediate segment names a test, which cannot have children.
    #[error("'{path}' is a test and cannot contain other nodes")]
    TestInPath { path: String },
}

// ============================================================================
// Test
// ============================================================================

/// Outcome of a test's last run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    #[default]
    NotRun,
    Passed,
    Failed,
    Errored,
}

/// Tallies from a test's last run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    pub ran: bool,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Messages of the errors attached to steps, in step order.
    pub exceptions: Vec<String>,
}

impl TestResults {
    pub fn state(&self) -> TestState {
        if !self.ran {
            TestState::NotRun
        } else if self.errors > 0 {
            TestState::Errored
        } else if self.failed > 0 {
            TestState::Failed
        } else {
            TestState::Passed
        }
    }
}

/// A leaf of the hierarchy: an ordered list of steps and its results.
#[derive(Debug, Clone)]
pub struct Test {
    name: String,
    steps: Vec<Step>,
    results: TestResults,
}

impl Test {
    pub fn new(name: impl Into<String>) -> Self {
        Test {
            name: name.into(),
            steps: Vec::new(),
            results: TestResults::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn results(&self) -> &TestResults {
        &self.results
    }

    pub fn state(&self) -> TestState {
        self.results.state()
    }

    /// Return every step and the results to the not-run state.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.results = TestResults::default();
    }

    /// Tally the current step states into the results.
    pub fn record_results(&mut self) {
        let mut results = TestResults {
            ran: true,
            ..TestResults::default()
        };
        for step in &self.steps {
            match step.state() {
                StepState::Passed => results.passed += 1,
                StepState::Failed => results.failed += 1,
                StepState::ExceptionThrown => results.errors += 1,
                StepState::NotRun | StepState::Executing => {}
            }
            if let Some(err) = step.error() {
                results.exceptions.push(err.to_string());
            }
        }
        self.results = results;
    }
}

// ============================================================================
// Suite
// ============================================================================

/// A node of the hierarchy.
#[derive(Debug, Clone)]
pub enum Node {
    Suite(Suite),
    Test(Test),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Suite(suite) => suite.name(),
            Node::Test(test) => test.name(),
        }
    }

    pub fn as_suite(&self) -> Option<&Suite> {
        match self {
            Node::Suite(suite) => Some(suite),
            Node::Test(_) => None,
        }
    }

    pub fn as_test(&self) -> Option<&Test> {
        match self {
            Node::Test(test) => Some(test),
            Node::Suite(_) => None,
        }
    }

    pub fn as_test_mut(&mut self) -> Option<&mut Test> {
        match self {
            Node::Test(test) => Some(test),
            Node::Suite(_) => None,
        }
    }
}

/// A container of suites and tests, ordered by insertion.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    name: String,
    children: IndexMap<String, Node>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Suite {
            name: name.into(),
            children: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Return the child suite `name`, creating it if absent.
    pub fn add_suite(&mut self, name: &str) -> Result<&mut Suite, HierarchyError> {
        let name = validated_segment(name)?;
        let node = self
            .children
            .entry(name.clone())
            .or_insert_with(|| Node::Suite(Suite::new(name.clone())));
        match node {
            Node::Suite(suite) => Ok(suite),
            Node::Test(_) => Err(HierarchyError::TestInPath { path: name }),
        }
    }

    /// Add a new test `name`. A child with the same name is a duplicate.
    pub fn add_test(&mut self, name: &str) -> Result<&mut Test, HierarchyError> {
        let name = validated_segment(name)?;
        match self.children.entry(name) {
            Entry::Occupied(entry) => Err(HierarchyError::DuplicateNode {
                path: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let test = Test::new(entry.key().clone());
                let path = entry.key().clone();
                entry
                    .insert(Node::Test(test))
                    .as_test_mut()
                    .ok_or(HierarchyError::DuplicateNode { path })
            }
        }
    }

    /// Find the node at `path`, relative to this suite.
    pub fn find(&self, path: &PathAddress) -> Option<&Node> {
        let (last, ancestors) = path.segments().split_last()?;
        let mut suite = self;
        for segment in ancestors {
            suite = suite.children.get(segment)?.as_suite()?;
        }
        suite.children.get(last)
    }

    fn find_mut(&mut self, path: &PathAddress) -> Option<&mut Node> {
        let (last, ancestors) = path.segments().split_last()?;
        let mut suite = self;
        for segment in ancestors {
            suite = match suite.children.get_mut(segment)? {
                Node::Suite(child) => child,
                Node::Test(_) => return None,
            };
        }
        suite.children.get_mut(last)
    }

    pub fn find_test(&self, path: &PathAddress) -> Option<&Test> {
        self.find(path)?.as_test()
    }

    pub fn find_test_mut(&mut self, path: &PathAddress) -> Option<&mut Test> {
        self.find_mut(path)?.as_test_mut()
    }

    /// Find the suite at `path`; the root address is this suite.
    pub fn find_suite(&self, path: &PathAddress) -> Option<&Suite> {
        if path.is_root() {
            return Some(self);
        }
        self.find(path)?.as_suite()
    }

    /// All tests below this suite, depth-first in insertion order.
    pub fn all_tests(&self) -> AllTests<'_> {
        AllTests {
            stack: vec![self.children.values()],
        }
    }

    /// All tests below this suite with their addresses relative to it.
    pub fn tests_with_paths(&self) -> TestsWithPaths<'_> {
        TestsWithPaths {
            stack: vec![(PathAddress::root(), self.children.values())],
        }
    }

    /// Disjoint mutable handles to every test, depth-first in insertion order.
    pub fn tests_mut(&mut self) -> Vec<&mut Test> {
        let mut tests = Vec::new();
        let mut stack: Vec<ValuesMut<'_, String, Node>> = vec![self.children.values_mut()];
        while let Some(top) = stack.last_mut() {
            match top.next() {
                Some(Node::Test(test)) => tests.push(test),
                Some(Node::Suite(suite)) => stack.push(suite.children.values_mut()),
                None => {
                    stack.pop();
                }
            }
        }
        tests
    }

    pub fn test_count(&self) -> usize {
        self.all_tests().count()
    }

    /// Reset every test below this suite. The structure is unchanged.
    pub fn clear_results(&mut self) {
        for test in self.tests_mut() {
            test.reset();
        }
    }
}

fn validated_segment(name: &str) -> Result<String, HierarchyError> {
    let path = PathAddress::from_segments([name.trim()])?;
    Ok(path.segments()[0].clone())
}

// ============================================================================
// Traversal
// ============================================================================

/// Lazy depth-first iterator over tests. See [`Suite::all_tests`].
pub struct AllTests<'a> {
    stack: Vec<Values<'a, String, Node>>,
}

impl<'a> Iterator for AllTests<'a> {
    type Item = &'a Test;

    fn next(&mut self) -> Option<&'a Test> {
        while let Some(top) = self.stack.last_mut() {
            match top.next() {
                Some(Node::Test(test)) => return Some(test),
                Some(Node::Suite(suite)) => self.stack.push(suite.children.values()),
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

/// Lazy depth-first iterator over tests and their addresses.
pub struct TestsWithPaths<'a> {
    stack: Vec<(PathAddress, Values<'a, String, Node>)>,
}

impl<'a> Iterator for TestsWithPaths<'a> {
    type Item = (PathAddress, &'a Test);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((prefix, top)) = self.stack.last_mut() {
            match top.next() {
                Some(Node::Test(test)) => return Some((prefix.join(test.name()), test)),
                Some(Node::Suite(suite)) => {
                    let path = prefix.join(suite.name());
                    self.stack.push((path, suite.children.values()));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

// ============================================================================
// Hierarchy
// ============================================================================

/// The root of a loaded specification project.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    root: Suite,
}

impl Hierarchy {
    pub fn new() -> Self {
        Hierarchy::default()
    }

    /// Create an empty hierarchy for the project `name`.
    ///
    /// The name labels the root suite; it is not part of any test's path.
    pub fn named(name: impl Into<String>) -> Self {
        Hierarchy {
            root: Suite::new(name),
        }
    }

    /// Project name. Empty for [`Hierarchy::new`].
    pub fn name(&self) -> &str {
        self.root.name()
    }

    pub fn root(&self) -> &Suite {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Suite {
        &mut self.root
    }

    /// Parse `path_text` and add a new test there. See [`Hierarchy::add_test_at`].
    pub fn add_test(&mut self, path_text: &str) -> Result<&mut Test, HierarchyError> {
        let path = PathAddress::parse(path_text)?;
        self.add_test_at(&path)
    }

    /// Add a new test at `path`, creating missing intermediate suites.
    ///
    /// Existing suites along the path are reused. Fails when the path is
    /// the root, when a node already exists at `path`, or when an
    /// intermediate segment names a test.
    pub fn add_test_at(&mut self, path: &PathAddress) -> Result<&mut Test, HierarchyError> {
        let Some((name, ancestors)) = path.segments().split_last() else {
            return Err(HierarchyError::RootAddress);
        };

        let mut suite = &mut self.root;
        let mut walked = PathAddress::root();
        for segment in ancestors {
            walked = walked.join(segment);
            suite = suite.add_suite(segment).map_err(|err| match err {
                HierarchyError::TestInPath { .. } => HierarchyError::TestInPath {
                    path: walked.to_string(),
                },
                other => other,
            })?;
        }

        debug!(path = %path, "adding test");
        suite.add_test(name).map_err(|err| match err {
            HierarchyError::DuplicateNode { .. } => HierarchyError::DuplicateNode {
                path: path.to_string(),
            },
            other => other,
        })
    }

    pub fn find(&self, path: &PathAddress) -> Option<&Node> {
        self.root.find(path)
    }

    pub fn find_test(&self, path: &PathAddress) -> Option<&Test> {
        self.root.find_test(path)
    }

    pub fn find_test_mut(&mut self, path: &PathAddress) -> Option<&mut Test> {
        self.root.find_test_mut(path)
    }

    pub fn find_suite(&self, path: &PathAddress) -> Option<&Suite> {
        self.root.find_suite(path)
    }

    pub fn all_tests(&self) -> AllTests<'_> {
        self.root.all_tests()
    }

    pub fn tests_with_paths(&self) -> TestsWithPaths<'_> {
        self.root.tests_with_paths()
    }

    pub fn tests_mut(&mut self) -> Vec<&mut Test> {
        self.root.tests_mut()
    }

    pub fn test_count(&self) -> usize {
        self.root.test_count()
    }

    /// Reset every test to not-run. The structure is unchanged.
    pub fn clear_results(&mut self) {
        self.root.clear_results();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepError;

    fn path(text: &str) -> PathAddress {
        PathAddress::parse(text).unwrap()
    }

    fn sample() -> Hierarchy {
        let mut hierarchy = Hierarchy::new();
        for p in ["a/b/c", "a/b/d", "a/e", "f", "g/h"] {
            hierarchy.add_test(p).unwrap();
        }
        hierarchy
    }

    mod add_test {
        use super::*;

        #[test]
        fn named_hierarchy_keeps_name_out_of_paths() {
            let mut hierarchy = Hierarchy::named("Banking");
            hierarchy.add_test("Deposits/Small").unwrap();
            assert_eq!(hierarchy.name(), "Banking");
            assert_eq!(hierarchy.root().name(), "Banking");
            assert_eq!(Hierarchy::new().name(), "");

            let paths: Vec<String> = hierarchy
                .tests_with_paths()
                .map(|(path, _)| path.to_string())
                .collect();
            assert_eq!(paths, ["Deposits/Small"]);
        }

        #[test]
        fn creates_intermediate_suites() {
            let mut hierarchy = Hierarchy::new();
            let test = hierarchy.add_test("a/b/c").unwrap();
            assert_eq!(test.name(), "c");
            assert!(test.steps().is_empty());

            assert!(hierarchy.find_suite(&path("a")).is_some());
            assert!(hierarchy.find_suite(&path("a/b")).is_some());
            assert!(hierarchy.find_test(&path("a/b/c")).is_some());
            assert_eq!(hierarchy.find_suite(&path("a/b")).unwrap().len(), 1);
        }

        #[test]
        fn leaf_under_root_attaches_to_root() {
            let mut hierarchy = Hierarchy::new();
            hierarchy.add_test("Login").unwrap();
            assert!(hierarchy.root().child("Login").unwrap().as_test().is_some());
        }

        #[test]
        fn reuses_existing_suites() {
            let hierarchy = sample();
            let a = hierarchy.find_suite(&path("a")).unwrap();
            let names: Vec<&str> = a.children().map(Node::name).collect();
            assert_eq!(names, ["b", "e"]);
            assert_eq!(hierarchy.root().len(), 3);
        }

        #[test]
        fn duplicate_path_is_rejected() {
            let mut hierarchy = sample();
            let err = hierarchy.add_test("a/b/c").unwrap_err();
            assert_eq!(
                err,
                HierarchyError::DuplicateNode {
                    path: "a/b/c".to_string()
                }
            );
            assert_eq!(hierarchy.test_count(), 5);
        }

        #[test]
        fn suite_name_cannot_be_reused_as_test() {
            let mut hierarchy = sample();
            assert!(matches!(
                hierarchy.add_test("a/b"),
                Err(HierarchyError::DuplicateNode { .. })
            ));
        }

        #[test]
        fn test_cannot_contain_nodes() {
            let mut hierarchy = sample();
            let err = hierarchy.add_test("a/e/x").unwrap_err();
            assert_eq!(
                err,
                HierarchyError::TestInPath {
                    path: "a/e".to_string()
                }
            );
        }

        #[test]
        fn malformed_paths_are_configuration_errors() {
            let mut hierarchy = Hierarchy::new();
            assert!(matches!(
                hierarchy.add_test("a//b"),
                Err(HierarchyError::MalformedPath(_))
            ));
            assert_eq!(hierarchy.add_test("  ").unwrap_err(), HierarchyError::RootAddress);
            assert!(hierarchy.root().is_empty());
        }

        #[test]
        fn suite_level_names_are_validated() {
            let mut suite = Suite::new("root");
            assert!(suite.add_test("x/y").is_err());
            assert!(suite.add_suite(" ").is_err());
            assert_eq!(suite.add_test(" spaced ").unwrap().name(), "spaced");
        }
    }

    mod traversal {
        use super::*;

        #[test]
        fn depth_first_insertion_order() {
            let hierarchy = sample();
            let names: Vec<&str> = hierarchy.all_tests().map(Test::name).collect();
            assert_eq!(names, ["c", "d", "e", "f", "h"]);
        }

        #[test]
        fn restartable_without_side_effects() {
            let hierarchy = sample();
            let first: Vec<&str> = hierarchy.all_tests().map(Test::name).collect();
            let second: Vec<&str> = hierarchy.all_tests().map(Test::name).collect();
            assert_eq!(first, second);
            assert_eq!(hierarchy.test_count(), 5);
        }

        #[test]
        fn paths_accompany_tests() {
            let hierarchy = sample();
            let paths: Vec<String> = hierarchy
                .tests_with_paths()
                .map(|(p, _)| p.to_string())
                .collect();
            assert_eq!(paths, ["a/b/c", "a/b/d", "a/e", "f", "g/h"]);
        }

        #[test]
        fn mutable_handles_follow_the_same_order() {
            let mut hierarchy = sample();
            let names: Vec<String> = hierarchy
                .tests_mut()
                .into_iter()
                .map(|t| t.name().to_string())
                .collect();
            assert_eq!(names, ["c", "d", "e", "f", "h"]);
        }

        #[test]
        fn empty_suites_yield_nothing() {
            let mut hierarchy = Hierarchy::new();
            hierarchy.root_mut().add_suite("empty").unwrap();
            assert_eq!(hierarchy.all_tests().count(), 0);
            assert_eq!(hierarchy.tests_with_paths().count(), 0);
        }

        #[test]
        fn find_distinguishes_suites_and_tests() {
            let hierarchy = sample();
            assert!(hierarchy.find_test(&path("a/b")).is_none());
            assert!(hierarchy.find_suite(&path("a/b/c")).is_none());
            assert!(hierarchy.find(&path("a/b/c/z")).is_none());
            assert!(hierarchy.find_suite(&PathAddress::root()).is_some());
            assert!(hierarchy.find(&PathAddress::root()).is_none());
        }
    }

    mod results {
        use super::*;

        fn run_test_with(states: &[bool]) -> Test {
            let mut test = Test::new("t");
            for (i, passed) in states.iter().enumerate() {
                let mut step = Step::new(format!("s{}", i));
                step.begin();
                step.finish(*passed);
                test.add_step(step);
            }
            test.record_results();
            test
        }

        #[test]
        fn tally_drives_state() {
            assert_eq!(Test::new("fresh").state(), TestState::NotRun);
            assert_eq!(run_test_with(&[true, true]).state(), TestState::Passed);

            let test = run_test_with(&[true, false]);
            assert_eq!(test.state(), TestState::Failed);
            assert_eq!(test.results().passed, 1);
            assert_eq!(test.results().failed, 1);
        }

        #[test]
        fn exceptions_are_recorded() {
            let mut test = run_test_with(&[true]);
            let mut step = Step::new("boom");
            step.begin();
            step.throw(StepError::Cancelled);
            test.add_step(step);
            test.record_results();
            assert_eq!(test.state(), TestState::Errored);
            assert_eq!(test.results().exceptions, ["cancelled before execution"]);
        }

        #[test]
        fn clear_results_resets_without_restructuring() {
            let mut hierarchy = Hierarchy::new();
            {
                let test = hierarchy.add_test("a/b/c").unwrap();
                let mut step = Step::new("s");
                step.begin();
                step.finish(true);
                test.add_step(step);
                test.record_results();
            }
            assert_eq!(
                hierarchy.find_test(&path("a/b/c")).unwrap().state(),
                TestState::Passed
            );

            hierarchy.clear_results();
            hierarchy.clear_results();

            let test = hierarchy.find_test(&path("a/b/c")).unwrap();
            assert_eq!(test.state(), TestState::NotRun);
            assert_eq!(test.steps()[0].state(), StepState::NotRun);
            assert_eq!(test.steps().len(), 1);
            assert_eq!(hierarchy.test_count(), 1);
        }
    }
}
