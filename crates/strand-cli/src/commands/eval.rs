//! `strand eval`: run one method on the reference evaluator

use super::{load_config, load_unit};
use crate::output::StyledOutput;
use anyhow::Context;
use std::path::Path;
use strand_backend::eval::{Evaluator, FakeRuntime, ScriptedIntrinsic, Value};
use strand_backend::{Backend, MethodRef};

pub fn execute(
    out: &mut StyledOutput,
    input: &Path,
    method: &str,
    args: Vec<i32>,
    config: Option<&Path>,
    suspend: bool,
) -> anyhow::Result<()> {
    let method: MethodRef = method
        .parse()
        .with_context(|| format!("Invalid method reference `{}`", method))?;
    let config = load_config(config)?;
    let intrinsics = config.intrinsics.clone();
    let unit = load_unit(input)?;
    let compiled = Backend::new(config)
        .compile(unit)
        .with_context(|| format!("Failed to compile {}", input.display()))?;

    let mut runtime = FakeRuntime::new();
    for intrinsic in intrinsics {
        let script = if suspend {
            ScriptedIntrinsic::suspending(Value::int(0))
        } else {
            ScriptedIntrinsic::immediate(Value::int(0))
        };
        runtime.script(intrinsic, script);
    }

    let mut evaluator = Evaluator::with_runtime(&compiled, runtime);
    let args = args.into_iter().map(Value::int).collect();
    let summary = evaluator
        .run(&method, args)
        .with_context(|| format!("Evaluation of {} failed", method))?;

    out.line(&summary.value.to_string());
    out.status(
        "Finished",
        &format!("{} after {} suspensions", method, summary.suspensions),
    );
    Ok(())
}
