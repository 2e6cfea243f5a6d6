//! Call graph over translated method bodies
//!
//! Only call sites that may suspend are recorded: invocations at statement
//! level whose upstream flag allows suspension, and class initializations
//! (a call to the class's `<clinit>`).

use crate::ast::{ExprKind, Invocation, MethodBody, Statement};
use crate::ir::{InvocationKind, MethodRef, Unit};
use rustc_hash::{FxHashMap, FxHashSet};

/// One possibly-suspending call site
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub caller: MethodRef,
    pub callee: MethodRef,
    /// Dispatches through overrides of `callee`
    pub virtual_call: bool,
}

#[derive(Debug, Default)]
pub struct CallGraph {
    callers: FxHashMap<MethodRef, Vec<CallSite>>,
    site_count: usize,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the call sites of one method body
    pub fn add_body(&mut self, caller: &MethodRef, body: &MethodBody) {
        let mut sites = FxHashSet::default();
        for stmt in &body.statements {
            stmt.walk(&mut |s| match s {
                Statement::Assignment { right, .. } => {
                    if let ExprKind::Invocation(invocation) = &right.kind {
                        if let Some(site) = site_for(caller, invocation) {
                            sites.insert(site);
                        }
                    }
                }
                Statement::Return {
                    value: Some(value), ..
                } => {
                    if let ExprKind::Invocation(invocation) = &value.kind {
                        if let Some(site) = site_for(caller, invocation) {
                            sites.insert(site);
                        }
                    }
                }
                Statement::InitClass { class, .. } => {
                    sites.insert(CallSite {
                        caller: caller.clone(),
                        callee: MethodRef::class_initializer(class.clone()),
                        virtual_call: false,
                    });
                }
                _ => {}
            });
        }
        for site in sites {
            self.add_site(site);
        }
    }

    pub fn add_site(&mut self, site: CallSite) {
        self.site_count += 1;
        self.callers.entry(site.callee.clone()).or_default().push(site);
    }

    /// Sites invoking `callee`
    pub fn callers_of(&self, callee: &MethodRef) -> &[CallSite] {
        self.callers
            .get(callee)
            .map(|sites| sites.as_slice())
            .unwrap_or(&[])
    }

    pub fn site_count(&self) -> usize {
        self.site_count
    }
}

fn site_for(caller: &MethodRef, invocation: &Invocation) -> Option<CallSite> {
    if !invocation.may_suspend {
        return None;
    }
    Some(CallSite {
        caller: caller.clone(),
        callee: invocation.method.clone(),
        virtual_call: invocation.kind == InvocationKind::Virtual,
    })
}

/// Ancestor methods each unit method overrides
#[derive(Debug, Default)]
pub struct OverrideIndex {
    overridden: FxHashMap<MethodRef, Vec<MethodRef>>,
}

impl OverrideIndex {
    pub fn build(unit: &Unit) -> Self {
        let mut overridden: FxHashMap<MethodRef, Vec<MethodRef>> = FxHashMap::default();
        for class in &unit.classes {
            let ancestors = ancestors(unit, &class.name);
            for method in &class.methods {
                let reference = &method.reference;
                if method.is_static()
                    || reference.is_constructor()
                    || reference.is_class_initializer()
                {
                    continue;
                }
                let targets: Vec<MethodRef> = ancestors
                    .iter()
                    .filter_map(|ancestor| unit.class(ancestor))
                    .flat_map(|def| def.methods.iter())
                    .filter(|m| !m.is_static() && m.reference.same_signature(reference))
                    .map(|m| m.reference.clone())
                    .collect();
                if !targets.is_empty() {
                    overridden.insert(reference.clone(), targets);
                }
            }
        }
        Self { overridden }
    }

    /// Methods `method` overrides, nearest ancestor first
    pub fn overridden_by(&self, method: &MethodRef) -> &[MethodRef] {
        self.overridden
            .get(method)
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }
}

/// Proper ancestors of `class` (parents, then interfaces), breadth first
fn ancestors(unit: &Unit, class: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    let mut queue: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    queue.push_back(class.to_string());
    while let Some(current) = queue.pop_front() {
        let Some(def) = unit.class(&current) else {
            continue;
        };
        for next in def.parent.iter().chain(def.interfaces.iter()) {
            if next != class && !result.contains(next) {
                result.push(next.clone());
                queue.push_back(next.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::ir::{ClassDef, Method, Var};

    fn call(method: &str, kind: InvocationKind, may_suspend: bool) -> Statement {
        Statement::assign(
            Expr::var(Var(1)),
            Expr::invoke(Invocation {
                method: method.parse().unwrap(),
                kind,
                instance: None,
                arguments: vec![],
                may_suspend,
            }),
        )
    }

    #[test]
    fn test_collects_flagged_sites_only() {
        let caller: MethodRef = "A.run()V".parse().unwrap();
        let mut body = MethodBody::new(2);
        body.statements.push(call("B.f()I", InvocationKind::Static, true));
        body.statements.push(call("B.g()I", InvocationKind::Static, false));
        body.statements.push(Statement::InitClass {
            class: "C".into(),
            suspends: false,
            location: None,
        });

        let mut graph = CallGraph::new();
        graph.add_body(&caller, &body);
        assert_eq!(graph.site_count(), 2);
        assert_eq!(graph.callers_of(&"B.f()I".parse().unwrap()).len(), 1);
        assert!(graph.callers_of(&"B.g()I".parse().unwrap()).is_empty());
        assert_eq!(
            graph.callers_of(&MethodRef::class_initializer("C"))[0].caller,
            caller
        );
    }

    #[test]
    fn test_override_index_follows_parents_and_interfaces() {
        let mut unit = Unit::new();
        let mut iface = ClassDef::new("I");
        iface.methods.push(Method::new("I.run()V".parse().unwrap(), 1));
        let mut base = ClassDef::new("Base");
        base.methods.push(Method::new("Base.run()V".parse().unwrap(), 1));
        let mut derived = ClassDef::new("Derived");
        derived.parent = Some("Base".into());
        derived.interfaces.push("I".into());
        derived
            .methods
            .push(Method::new("Derived.run()V".parse().unwrap(), 1));
        unit.classes = vec![iface, base, derived];

        let index = OverrideIndex::build(&unit);
        let overridden = index.overridden_by(&"Derived.run()V".parse().unwrap());
        assert_eq!(overridden.len(), 2);
        assert_eq!(overridden[0].class, "Base");
        assert!(index.overridden_by(&"Base.run()V".parse().unwrap()).is_empty());
    }
}
