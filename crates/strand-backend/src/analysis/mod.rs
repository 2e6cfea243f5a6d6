//! Suspending-call analysis
//!
//! Computes the [`SuspendSet`]: every method that may suspend its caller,
//! either because it blocks natively or because it invokes (directly, or via
//! a virtual call that may dispatch to an override) a method already in the
//! set. The set is computed once per unit and frozen before any method is
//! rendered.

pub mod call_graph;

pub use call_graph::{CallGraph, CallSite, OverrideIndex};

use crate::ast::{Invocation, MethodBody};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::ir::{InvocationKind, Invoke, MethodRef, Unit};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Methods that may suspend their caller
#[derive(Debug, Clone, Default)]
pub struct SuspendSet {
    methods: FxHashSet<MethodRef>,
    /// Methods with a suspending override; virtual calls to them suspend
    families: FxHashSet<MethodRef>,
}

impl SuspendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, method: &MethodRef) -> bool {
        self.methods.contains(method)
    }

    /// A virtual call to `method` may reach a suspending override
    pub fn family_suspends(&self, method: &MethodRef) -> bool {
        self.families.contains(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Members in a stable order
    pub fn sorted(&self) -> Vec<&MethodRef> {
        let mut methods: Vec<_> = self.methods.iter().collect();
        methods.sort();
        methods
    }

    /// Does this IR call site suspend its caller?
    pub fn invocation_suspends(&self, invoke: &Invoke) -> bool {
        invoke.may_suspend && self.call_suspends(&invoke.method, invoke.kind)
    }

    /// Does this tree call site suspend its caller?
    pub fn expression_suspends(&self, invocation: &Invocation) -> bool {
        invocation.may_suspend && self.call_suspends(&invocation.method, invocation.kind)
    }

    pub fn class_init_suspends(&self, class: &str) -> bool {
        self.methods.contains(&MethodRef::class_initializer(class))
    }

    fn call_suspends(&self, method: &MethodRef, kind: InvocationKind) -> bool {
        self.methods.contains(method)
            || (kind == InvocationKind::Virtual && self.families.contains(method))
    }

    pub fn insert(&mut self, method: MethodRef) -> bool {
        self.methods.insert(method)
    }
}

/// Worklist fixpoint over the reverse call graph
pub struct SuspendAnalyzer<'a> {
    unit: &'a Unit,
    config: &'a BackendConfig,
    graph: CallGraph,
    overrides: OverrideIndex,
}

impl<'a> SuspendAnalyzer<'a> {
    pub fn new(unit: &'a Unit, config: &'a BackendConfig) -> Self {
        Self {
            unit,
            config,
            graph: CallGraph::new(),
            overrides: OverrideIndex::build(unit),
        }
    }

    /// Record the call sites of one translated method
    pub fn add_body(&mut self, method: &MethodRef, body: &MethodBody) {
        self.graph.add_body(method, body);
    }

    pub fn add_bodies<'b>(&mut self, bodies: impl IntoIterator<Item = (&'b MethodRef, &'b MethodBody)>) {
        for (method, body) in bodies {
            self.add_body(method, body);
        }
    }

    /// Methods that suspend without calling anything
    fn roots(&self) -> Vec<MethodRef> {
        let mut roots: Vec<MethodRef> = self.config.intrinsics.clone();
        for method in self.unit.methods() {
            let blocking_monitor = self.config.monitors_suspend
                && (method.modifiers.synchronized || method.has_monitor());
            if method.annotations.is_async || blocking_monitor {
                roots.push(method.reference.clone());
            }
        }
        roots
    }

    pub fn analyze(self) -> BackendResult<SuspendSet> {
        let _span = tracing::debug_span!("suspend_analysis", sites = self.graph.site_count()).entered();

        let mut set = SuspendSet::new();
        let mut queue: VecDeque<MethodRef> = VecDeque::new();
        for root in self.roots() {
            if set.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(method) = queue.pop_front() {
            tracing::trace!(method = %method, "propagating suspension");

            // Direct calls reach `method` itself; virtual calls also reach it
            // through every ancestor it overrides.
            let mut targets: Vec<(&MethodRef, bool)> = vec![(&method, false)];
            for ancestor in self.overrides.overridden_by(&method) {
                set.families.insert(ancestor.clone());
                targets.push((ancestor, true));
            }

            for (target, virtual_only) in targets {
                for site in self.graph.callers_of(target) {
                    if virtual_only && !site.virtual_call {
                        continue;
                    }
                    if set.insert(site.caller.clone()) {
                        tracing::trace!(caller = %site.caller, callee = %target, "caller suspends");
                        queue.push_back(site.caller.clone());
                    }
                }
            }
        }

        tracing::debug!(
            suspending = set.len(),
            families = set.families.len(),
            "suspend analysis reached fixpoint"
        );

        self.check_sync_claims(&set)?;
        Ok(set)
    }

    /// Methods annotated `sync` must stay out of the set
    fn check_sync_claims(&self, set: &SuspendSet) -> BackendResult<()> {
        let mut violations: Vec<MethodRef> = self
            .unit
            .methods()
            .filter(|m| m.annotations.sync && set.contains(&m.reference))
            .map(|m| m.reference.clone())
            .collect();
        if violations.is_empty() {
            return Ok(());
        }
        violations.sort();
        for method in &violations {
            tracing::error!(method = %method, "method claimed synchronous can suspend");
        }
        Err(BackendError::SyncClaimViolated(violations))
    }
}

/// Analyze a unit whose method bodies are already translated
pub fn analyze_bodies(
    unit: &Unit,
    config: &BackendConfig,
    bodies: &FxHashMap<MethodRef, MethodBody>,
) -> BackendResult<SuspendSet> {
    let mut analyzer = SuspendAnalyzer::new(unit, config);
    let mut methods: Vec<&MethodRef> = bodies.keys().collect();
    methods.sort();
    for method in methods {
        analyzer.add_body(method, &bodies[method]);
    }
    analyzer.analyze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Statement};
    use crate::ir::{ClassDef, Method, Var};

    fn mref(text: &str) -> MethodRef {
        text.parse().unwrap()
    }

    fn calling(callees: &[(&str, InvocationKind)]) -> MethodBody {
        let mut body = MethodBody::new(4);
        for (callee, kind) in callees {
            body.statements.push(Statement::assign(
                Expr::var(Var(1)),
                Expr::invoke(Invocation {
                    method: mref(callee),
                    kind: *kind,
                    instance: None,
                    arguments: vec![],
                    may_suspend: true,
                }),
            ));
        }
        body
    }

    fn config_with(intrinsics: &[&str]) -> BackendConfig {
        BackendConfig {
            intrinsics: intrinsics.iter().map(|m| mref(m)).collect(),
            ..BackendConfig::default()
        }
    }

    fn unit_of(methods: &[&str]) -> Unit {
        let mut unit = Unit::new();
        for text in methods {
            let reference = mref(text);
            let index = match unit.classes.iter().position(|c| c.name == reference.class) {
                Some(index) => index,
                None => {
                    unit.classes.push(ClassDef::new(reference.class.clone()));
                    unit.classes.len() - 1
                }
            };
            unit.classes[index].methods.push(Method::new(reference, 2));
        }
        unit
    }

    #[test]
    fn test_transitive_callers_join() {
        let unit = unit_of(&["A.a()V", "A.b()V", "A.c()V"]);
        let config = config_with(&["rt.T.park()V"]);
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("A.a()V"), calling(&[("A.b()V", InvocationKind::Static)]));
        bodies.insert(mref("A.b()V"), calling(&[("rt.T.park()V", InvocationKind::Static)]));
        bodies.insert(mref("A.c()V"), calling(&[]));

        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(set.contains(&mref("A.a()V")));
        assert!(set.contains(&mref("A.b()V")));
        assert!(!set.contains(&mref("A.c()V")));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_recursion_terminates() {
        let unit = unit_of(&["A.f()V", "A.g()V"]);
        let config = config_with(&["rt.T.park()V"]);
        let mut bodies = FxHashMap::default();
        bodies.insert(
            mref("A.f()V"),
            calling(&[("A.g()V", InvocationKind::Static), ("rt.T.park()V", InvocationKind::Static)]),
        );
        bodies.insert(mref("A.g()V"), calling(&[("A.f()V", InvocationKind::Static)]));

        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(set.contains(&mref("A.f()V")));
        assert!(set.contains(&mref("A.g()V")));
    }

    #[test]
    fn test_async_annotation_is_a_root() {
        let mut unit = unit_of(&["A.native()V", "A.caller()V"]);
        unit.classes[0].methods[0].annotations.is_async = true;
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("A.caller()V"), calling(&[("A.native()V", InvocationKind::Static)]));

        let set = analyze_bodies(&unit, &config_with(&[]), &bodies).unwrap();
        assert!(set.contains(&mref("A.caller()V")));
    }

    #[test]
    fn test_synchronized_roots_follow_config() {
        let mut unit = unit_of(&["A.locked()V"]);
        unit.classes[0].methods[0].modifiers.synchronized = true;
        let bodies = FxHashMap::default();

        let set = analyze_bodies(&unit, &config_with(&[]), &bodies).unwrap();
        assert!(set.contains(&mref("A.locked()V")));

        let config = BackendConfig {
            monitors_suspend: false,
            ..config_with(&[])
        };
        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_virtual_call_reaches_suspending_override() {
        let mut unit = unit_of(&["Base.run()V", "Derived.run()V", "Main.direct()V", "Main.dyn()V"]);
        unit.classes[1].parent = Some("Base".into());
        let config = config_with(&["rt.T.park()V"]);
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("Derived.run()V"), calling(&[("rt.T.park()V", InvocationKind::Static)]));
        bodies.insert(mref("Main.direct()V"), calling(&[("Base.run()V", InvocationKind::Special)]));
        bodies.insert(mref("Main.dyn()V"), calling(&[("Base.run()V", InvocationKind::Virtual)]));

        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(set.contains(&mref("Main.dyn()V")));
        assert!(!set.contains(&mref("Main.direct()V")));
        assert!(!set.contains(&mref("Base.run()V")));
        assert!(set.family_suspends(&mref("Base.run()V")));
    }

    #[test]
    fn test_class_init_counts_as_call() {
        let unit = unit_of(&["A.<clinit>()V", "B.use()V"]);
        let config = config_with(&["rt.T.park()V"]);
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("A.<clinit>()V"), calling(&[("rt.T.park()V", InvocationKind::Static)]));
        let mut user = MethodBody::new(1);
        user.statements.push(Statement::InitClass {
            class: "A".into(),
            suspends: false,
            location: None,
        });
        bodies.insert(mref("B.use()V"), user);

        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(set.class_init_suspends("A"));
        assert!(set.contains(&mref("B.use()V")));
    }

    #[test]
    fn test_sync_claim_violations_collected() {
        let mut unit = unit_of(&["A.x()V", "A.y()V"]);
        unit.classes[0].methods[0].annotations.sync = true;
        unit.classes[0].methods[1].annotations.sync = true;
        let config = config_with(&["rt.T.park()V"]);
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("A.x()V"), calling(&[("rt.T.park()V", InvocationKind::Static)]));
        bodies.insert(mref("A.y()V"), calling(&[("A.x()V", InvocationKind::Static)]));

        let err = analyze_bodies(&unit, &config, &bodies).unwrap_err();
        match err {
            BackendError::SyncClaimViolated(methods) => {
                assert_eq!(methods, vec![mref("A.x()V"), mref("A.y()V")])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_flagged_non_suspending_site_ignored() {
        let unit = unit_of(&["A.f()V"]);
        let config = config_with(&["rt.T.park()V"]);
        let mut body = calling(&[("rt.T.park()V", InvocationKind::Static)]);
        if let Statement::Assignment { right, .. } = &mut body.statements[0] {
            if let crate::ast::ExprKind::Invocation(inv) = &mut right.kind {
                inv.may_suspend = false;
            }
        }
        let mut bodies = FxHashMap::default();
        bodies.insert(mref("A.f()V"), body);

        let set = analyze_bodies(&unit, &config, &bodies).unwrap();
        assert!(!set.contains(&mref("A.f()V")));
    }
}
