//! `strand analyze`: report the suspend set and each method's lowering

use super::{load_config, load_unit};
use crate::output::StyledOutput;
use anyhow::Context;
use std::path::Path;
use strand_backend::{Backend, CompiledBody};

pub fn execute(out: &mut StyledOutput, input: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let unit = load_unit(input)?;
    let methods = unit.methods().filter(|m| m.has_body()).count();
    let compiled = Backend::new(config)
        .compile(unit)
        .with_context(|| format!("Failed to analyze {}", input.display()))?;

    for method in compiled.suspend_set.sorted() {
        match compiled.body(method) {
            Some(CompiledBody::Async(body)) => out.line(&format!(
                "{} ({} parts, {} live)",
                method,
                body.part_count(),
                body.live.len()
            )),
            _ => out.line(&method.to_string()),
        }
    }
    if compiled.suspend_set.is_empty() {
        out.warning("no method of the unit can suspend");
    }
    out.status(
        "Analyzed",
        &format!("{} methods, {} may suspend", methods, compiled.suspend_set.len()),
    );
    Ok(())
}
