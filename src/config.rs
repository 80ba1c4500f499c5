/// When the startup preamble is written ahead of the translated units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapPolicy {
    /// Only for two or more units, one of which defines the entry function.
    /// A directory holding a single unit never gets a preamble.
    #[default]
    Auto,
    /// Whenever some unit defines the entry function, regardless of count.
    Always,
    Never,
}

/// Run-wide translation settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Value the preamble loads into SP.
    pub stack_origin: u16,
    /// Function the preamble calls with zero arguments.
    pub entry_function: String,
    pub source_extension: String,
    pub output_extension: String,
    pub bootstrap: BootstrapPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_origin: 256,
            entry_function: "Sys.init".to_string(),
            source_extension: "vm".to_string(),
            output_extension: "asm".to_string(),
            bootstrap: BootstrapPolicy::Auto,
        }
    }
}

impl Config {
    /// Decides whether a run over `units` units gets the preamble.
    pub fn wants_bootstrap(&self, units: usize, has_entry: bool) -> bool {
        match self.bootstrap {
            BootstrapPolicy::Auto => units > 1 && has_entry,
            BootstrapPolicy::Always => has_entry,
            BootstrapPolicy::Never => false,
        }
    }
}
