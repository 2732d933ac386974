//! Registered handler table mapping hook types to executables.
//!
//! Handlers are declared up front and validated when the engine is built;
//! nothing is resolved by string name at call time.

use crate::coord::types::HookType;
use crate::core::errors::{LatchError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An executable hook handler: the program to spawn plus arguments that
/// always precede the per-request arguments.
#[derive(Debug, Clone)]
pub struct HookHandler {
    pub program: PathBuf,
    pub base_args: Vec<String>,
}

/// Handler table keyed by hook type.
#[derive(Debug, Default)]
pub struct HookRegistry {
    handlers: HashMap<HookType, HookHandler>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        hook_type: HookType,
        program: impl Into<PathBuf>,
        base_args: Vec<String>,
    ) {
        self.handlers.insert(
            hook_type,
            HookHandler {
                program: program.into(),
                base_args,
            },
        );
    }

    pub fn get(&self, hook_type: HookType) -> Option<&HookHandler> {
        self.handlers.get(&hook_type)
    }

    pub fn contains(&self, hook_type: HookType) -> bool {
        self.handlers.contains_key(&hook_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Startup validation: absolute handler paths must exist. Bare program
    /// names are left to PATH resolution at spawn time.
    pub fn validate(&self) -> Result<()> {
        for (hook_type, handler) in &self.handlers {
            if handler.program.as_os_str().is_empty() {
                return Err(LatchError::registry_hook(
                    "handler program is empty",
                    hook_type.as_str(),
                ));
            }
            if handler.program.is_absolute() && !Path::new(&handler.program).exists() {
                return Err(LatchError::registry_hook(
                    format!("handler program not found: {}", handler.program.display()),
                    hook_type.as_str(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = HookRegistry::new();
        registry.register(HookType::Notify, "/bin/sh", vec!["-c".to_string()]);

        assert!(registry.contains(HookType::Notify));
        assert!(!registry.contains(HookType::PreEdit));
        let handler = registry.get(HookType::Notify).unwrap();
        assert_eq!(handler.base_args, vec!["-c".to_string()]);
    }

    #[test]
    fn test_validate_missing_absolute_program() {
        let mut registry = HookRegistry::new();
        registry.register(
            HookType::PreTask,
            "/definitely/not/a/real/hook",
            Vec::new(),
        );
        let err = registry.validate().unwrap_err();
        assert_eq!(err.category(), "registry");
    }

    #[test]
    fn test_validate_bare_name_allowed() {
        let mut registry = HookRegistry::new();
        registry.register(HookType::PreTask, "sh", vec!["-c".to_string()]);
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_program_rejected() {
        let mut registry = HookRegistry::new();
        registry.register(HookType::PreTask, "", Vec::new());
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_reregister_overwrites() {
        let mut registry = HookRegistry::new();
        registry.register(HookType::Notify, "/bin/sh", Vec::new());
        registry.register(HookType::Notify, "/bin/echo", Vec::new());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(HookType::Notify).unwrap().program,
            PathBuf::from("/bin/echo")
        );
    }
}
