//! Resolves the input path into an ordered list of units and drives the
//! parser and translator over them into a single assembly artifact.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::{Command, SourceCommand};
use crate::config::{BootstrapPolicy, Config};
use crate::error::{Error, Result};
use crate::parser;
use crate::translator::Translator;
use crate::{info, warn};

/// One translation unit: its basename and raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub source: String,
}

impl Unit {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Unit {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config(format!("invalid unit name: {}", path.display())))?;
        let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Unit::new(name, source))
    }
}

/// What to read and where to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Unit files, sorted by file name.
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    /// False for a lone file input, which never gets a preamble.
    pub bootstrap_allowed: bool,
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// Works out the units and the artifact path for `input`.
pub fn plan(input: &Path, config: &Config) -> Result<Plan> {
    if input.is_file() {
        if !has_extension(input, &config.source_extension) {
            return Err(Error::Config(format!(
                "{} is not a .{} file",
                input.display(),
                config.source_extension
            )));
        }
        return Ok(Plan {
            sources: vec![input.to_path_buf()],
            output: input.with_extension(&config.output_extension),
            bootstrap_allowed: false,
        });
    }

    if !input.is_dir() {
        return Err(Error::Config(format!("{} does not exist", input.display())));
    }

    let entries = fs::read_dir(input).map_err(|e| Error::io(input, e))?;
    let mut sources = vec![];
    for entry in entries {
        let path = entry.map_err(|e| Error::io(input, e))?.path();
        if path.is_file() && has_extension(&path, &config.source_extension) {
            sources.push(path);
        }
    }
    if sources.is_empty() {
        return Err(Error::Config(format!(
            "no .{} files found in {}",
            config.source_extension,
            input.display()
        )));
    }
    sources.sort();

    let canonical = fs::canonicalize(input).map_err(|e| Error::io(input, e))?;
    let dir_name = canonical
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    let output = input.join(format!("{}.{}", dir_name, config.output_extension));

    Ok(Plan {
        sources,
        output,
        bootstrap_allowed: true,
    })
}

fn defines(commands: &[SourceCommand], function: &str) -> bool {
    commands
        .iter()
        .any(|c| matches!(&c.command, Command::Function(name, _) if name == function))
}

fn parse_unit(unit: &Unit) -> Result<(&str, Vec<SourceCommand>)> {
    Ok((&unit.name, parser::parse(&unit.name, &unit.source)?))
}

/// Translates `units` into one assembly text.
///
/// The unit defining the entry function goes first, the rest follow sorted
/// by name. Nothing is returned unless every unit translates cleanly.
pub fn translate_units(units: &[Unit], config: &Config) -> Result<String> {
    if units.is_empty() {
        return Err(Error::Config("no translation units found".to_string()));
    }

    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.name.as_str()) {
            return Err(Error::Config(format!(
                "two units named `{}` would share static variables",
                unit.name
            )));
        }
    }

    let mut parsed = units
        .iter()
        .map(parse_unit)
        .collect::<Result<Vec<_>>>()?;
    parsed.sort_by(|a, b| a.0.cmp(b.0));

    let entry = parsed
        .iter()
        .position(|(_, commands)| defines(commands, &config.entry_function));
    if let Some(index) = entry {
        let unit = parsed.remove(index);
        parsed.insert(0, unit);
    }

    let bootstrap = config.wants_bootstrap(parsed.len(), entry.is_some());
    if parsed.len() > 1 && entry.is_none() && config.bootstrap != BootstrapPolicy::Never {
        warn!(
            "no unit defines {}, skipping bootstrap",
            config.entry_function
        );
    }

    let mut translator = Translator::new();
    let mut instructions: Vec<String> = vec![];
    if bootstrap {
        info!(
            "bootstrap: SP={}, call {}",
            config.stack_origin, config.entry_function
        );
        instructions.extend(translator.bootstrap(config.stack_origin, &config.entry_function));
    }

    for (name, commands) in &parsed {
        info!("translating {} ({} commands)", name, commands.len());
        translator.set_unit(name);
        instructions.push(format!("// Translating file: {}", name));
        instructions.extend(translator.translate(commands)?);
    }

    let mut text = instructions.join("\n");
    text.push('\n');
    Ok(text)
}

/// Writes `text` beside `output` and renames it into place, so a failed
/// write never leaves a truncated artifact behind.
fn write_artifact(output: &Path, text: &str) -> Result<()> {
    let mut staging = output.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    if let Err(e) = fs::write(&staging, text).and_then(|()| fs::rename(&staging, output)) {
        let _ = fs::remove_file(&staging);
        return Err(Error::io(output, e));
    }
    Ok(())
}

/// Translates everything under `input` and writes the artifact, returning
/// its path. The artifact is only created once translation succeeded.
pub fn run(input: &Path, config: &Config) -> Result<PathBuf> {
    let plan = plan(input, config)?;
    info!(
        "found {} unit(s), writing {}",
        plan.sources.len(),
        plan.output.display()
    );

    let units = plan
        .sources
        .iter()
        .map(|path| Unit::load(path))
        .collect::<Result<Vec<_>>>()?;

    let text = if plan.bootstrap_allowed {
        translate_units(&units, config)?
    } else {
        let config = Config {
            bootstrap: BootstrapPolicy::Never,
            ..config.clone()
        };
        translate_units(&units, &config)?
    };

    write_artifact(&plan.output, &text)?;
    info!("wrote {}", plan.output.display());
    Ok(plan.output)
}
