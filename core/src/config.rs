use serde::Deserialize;

/// Interpreter limits and defaults.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpConfig {
    /// Deepest allowed nesting of user function calls.
    pub max_func_depth: usize,
    /// Nesting bound for copy, display and (un)lock of nested containers.
    pub max_nest: usize,
    /// Case folding for comparisons written without `#` or `?`, used when the
    /// host has no `ignorecase` option.
    pub ignorecase: bool,
    /// Start with the sandbox active.
    pub sandbox: bool,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            max_func_depth: 100,
            max_nest: 100,
            ignorecase: false,
            sandbox: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() -> anyhow::Result<()> {
        let cfg: InterpConfig = toml::from_str("max_func_depth = 20\nignorecase = true\n")?;
        assert_eq!(cfg.max_func_depth, 20);
        assert!(cfg.ignorecase);
        assert_eq!(cfg.max_nest, 100);
        Ok(())
    }

    #[test]
    fn test_unknown_key_rejected() {
        let res: Result<InterpConfig, _> = toml::from_str("maxdepth = 3\n");
        assert!(res.is_err());
    }
}
