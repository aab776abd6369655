//! Factory plans and the compile seam.
//!
//! An entry describes how to produce its instance as a [`FactoryPlan`]; a
//! [`Compiler`] turns that description into a callable [`FactoryFn`]. The
//! default [`Interpreter`] walks the plan on every call. [`ClosureCompiler`]
//! folds the plan into nested closures once, up front. Both produce the
//! same instances.

use std::sync::Arc;

use crate::entry::{ActivatorFn, Arguments, DecoratorFn, FactoryFn};
use crate::error::Result;
use crate::injector::Injector;
use crate::instance::Instance;
use crate::key::{ServiceKey, ServiceType};

/// Tagged description of how an instance is produced.
pub enum FactoryPlan {
    /// Call an opaque factory.
    Invoke(FactoryFn),
    /// Resolve `dependencies` in order, then hand them to `activator`.
    Activate {
        requestor: ServiceKey,
        dependencies: Vec<ServiceKey>,
        activator: ActivatorFn,
    },
    /// Produce with `inner`, then pass the result through `decorator`.
    Decorate {
        inner: Box<FactoryPlan>,
        decorator: DecoratorFn,
    },
}

impl FactoryPlan {
    /// Interprets the plan against `injector`.
    pub fn evaluate(&self, injector: &dyn Injector, requested: &ServiceType) -> Result<Instance> {
        match self {
            FactoryPlan::Invoke(factory) => factory(injector, requested),
            FactoryPlan::Activate {
                requestor,
                dependencies,
                activator,
            } => activate(injector, requested, requestor, dependencies, activator),
            FactoryPlan::Decorate { inner, decorator } => {
                let instance = inner.evaluate(injector, requested)?;
                decorator(injector, requested, instance)
            }
        }
    }

    /// Number of plan nodes, decorators included.
    #[cfg(test)]
    fn depth(&self) -> usize {
        match self {
            FactoryPlan::Invoke(_) | FactoryPlan::Activate { .. } => 1,
            FactoryPlan::Decorate { inner, .. } => 1 + inner.depth(),
        }
    }
}

fn activate(
    injector: &dyn Injector,
    requested: &ServiceType,
    requestor: &ServiceKey,
    dependencies: &[ServiceKey],
    activator: &ActivatorFn,
) -> Result<Instance> {
    let values = dependencies
        .iter()
        .map(|key| injector.get(key))
        .collect::<Result<Vec<_>>>()?;
    let arguments = Arguments::new(
        requestor.clone(),
        requested.clone(),
        dependencies.to_vec(),
        values,
    );
    activator(&arguments)
}

/// Turns a plan into a callable factory.
pub trait Compiler: Send + Sync {
    fn compile(&self, plan: FactoryPlan) -> FactoryFn;
}

/// Evaluates the plan tree on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Compiler for Interpreter {
    fn compile(&self, plan: FactoryPlan) -> FactoryFn {
        let plan = Arc::new(plan);
        Arc::new(move |injector: &dyn Injector, requested: &ServiceType| {
            plan.evaluate(injector, requested)
        })
    }
}

/// Composes the plan into closures once; no tree walk at call time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClosureCompiler;

impl Compiler for ClosureCompiler {
    fn compile(&self, plan: FactoryPlan) -> FactoryFn {
        match plan {
            FactoryPlan::Invoke(factory) => factory,
            FactoryPlan::Activate {
                requestor,
                dependencies,
                activator,
            } => Arc::new(move |injector: &dyn Injector, requested: &ServiceType| {
                activate(injector, requested, &requestor, &dependencies, &activator)
            }),
            FactoryPlan::Decorate { inner, decorator } => {
                let inner = self.compile(*inner);
                Arc::new(move |injector: &dyn Injector, requested: &ServiceType| {
                    let instance = inner(injector, requested)?;
                    decorator(injector, requested, instance)
                })
            }
        }
    }
}
