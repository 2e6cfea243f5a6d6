//! `strand compile`: unit JSON to target source plus side channels

use super::{load_config, load_unit};
use crate::output::StyledOutput;
use anyhow::Context;
use std::path::{Path, PathBuf};
use strand_backend::ir::PrettyPrint;
use strand_backend::Backend;

pub struct CompileOptions {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub minify: bool,
    pub dump_ir: bool,
}

/// Files produced by one compilation
#[derive(Debug)]
pub struct Written {
    pub code: PathBuf,
    pub strings: Option<PathBuf>,
    pub debug: Option<PathBuf>,
}

pub fn execute(out: &mut StyledOutput, options: CompileOptions) -> anyhow::Result<()> {
    if options.dump_ir {
        let unit = load_unit(&options.input)?;
        out.line(&unit.pretty_print());
    }
    let written = compile_to_disk(&options)?;
    out.status("Compiled", &written.code.display().to_string());
    if let Some(strings) = &written.strings {
        out.status("Strings", &strings.display().to_string());
    }
    if let Some(debug) = &written.debug {
        out.status("Debug", &debug.display().to_string());
    }
    Ok(())
}

pub fn compile_to_disk(options: &CompileOptions) -> anyhow::Result<Written> {
    let mut config = load_config(options.config.as_deref())?;
    config.minify |= options.minify;
    let debug_locations = config.debug_locations;

    let unit = load_unit(&options.input)?;
    let rendered = Backend::new(config)
        .compile_unit(unit)
        .with_context(|| format!("Failed to compile {}", options.input.display()))?;

    let code = options
        .output
        .clone()
        .unwrap_or_else(|| options.input.with_extension("js"));
    write(&code, &rendered.code)?;

    let strings = if rendered.string_pool.is_empty() {
        None
    } else {
        let path = code.with_extension("strings.json");
        write(&path, &serde_json::to_string_pretty(&rendered.string_pool)?)?;
        Some(path)
    };

    let debug = if debug_locations {
        let path = code.with_extension("debug.json");
        write(&path, &serde_json::to_string_pretty(&rendered.debug)?)?;
        Some(path)
    } else {
        None
    };

    Ok(Written { code, strings, debug })
}

fn write(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/suspend.json")
    }

    fn options(dir: &Path, config: Option<PathBuf>) -> CompileOptions {
        CompileOptions {
            input: fixture(),
            config,
            output: Some(dir.join("out").join("counter.js")),
            minify: false,
            dump_ir: false,
        }
    }

    #[test]
    fn test_compile_writes_code_and_side_channels() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("strand.toml");
        std::fs::write(
            &config,
            "debug_locations = true\nintrinsics = [\"rt.Sched.block()I\"]\n",
        )
        .unwrap();

        let written = compile_to_disk(&options(dir.path(), Some(config))).unwrap();

        let code = std::fs::read_to_string(&written.code).unwrap();
        assert!(code.contains("function d_Counter_next()"), "{}", code);
        assert!(code.contains("$main: while (true)"), "{}", code);
        assert!(code.contains("$ticks = $tmp;"), "{}", code);

        let strings = std::fs::read_to_string(written.strings.unwrap()).unwrap();
        let strings: Vec<String> = serde_json::from_str(&strings).unwrap();
        assert_eq!(strings, vec!["counter".to_string()]);

        let debug = std::fs::read_to_string(written.debug.unwrap()).unwrap();
        assert!(debug.contains("Counter.java"), "{}", debug);
    }

    #[test]
    fn test_default_config_has_no_suspension() {
        let dir = tempfile::tempdir().unwrap();
        let written = compile_to_disk(&options(dir.path(), None)).unwrap();
        let code = std::fs::read_to_string(&written.code).unwrap();
        assert!(!code.contains("$main:"), "{}", code);
        assert!(written.debug.is_none());
    }

    #[test]
    fn test_invalid_config_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("strand.toml");
        std::fs::write(&config, "indent = \"wide\"\n").unwrap();

        let err = compile_to_disk(&options(dir.path(), Some(config))).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to load configuration"), "{}", message);
        assert!(message.contains("strand.toml"), "{}", message);
    }
}
