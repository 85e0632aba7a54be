//! Published script entries, one per source identity
//!
//! The registry is owned by the runner and only ever mutated on the tick
//! thread at a tick boundary, so the execution pass always sees a consistent
//! set of entries. Publication replaces a whole entry at once; the execution
//! coordinator can never observe a half-updated one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wasmtime::Module;

use crate::loader::LoadedScript;

/// One published script: identity, current revision, and the live instance
pub struct RegistryEntry {
    pub path: PathBuf,
    pub label: String,
    pub revision: u64,
    pub module: Module,
    pub instance: LoadedScript,
}

/// Maps script identity to its current loaded instance.
///
/// Entries keep insertion order; a reload replaces an entry in place so the
/// execution order of surviving scripts never shifts.
#[derive(Default)]
pub struct ScriptRegistry {
    entries: Vec<RegistryEntry>,
    /// Revision counters outlive entries so a removed-then-re-added script
    /// keeps a strictly increasing revision history.
    revisions: HashMap<PathBuf, u64>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn revision_of(&self, path: &Path) -> Option<u64> {
        self.entries.iter().find(|e| e.path == path).map(|e| e.revision)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// The revision the next successful publish for this identity will get
    pub fn next_revision(&self, path: &Path) -> u64 {
        self.revisions.get(path).copied().unwrap_or(0) + 1
    }

    /// Publish a newly loaded instance, superseding any current entry.
    ///
    /// Returns the new revision and, on a reload, the superseded module and
    /// instance for the caller to tear down and retire.
    pub fn publish(
        &mut self,
        path: PathBuf,
        label: String,
        module: Module,
        instance: LoadedScript,
    ) -> (u64, Option<(Module, LoadedScript)>) {
        let revision = self.next_revision(&path);
        self.revisions.insert(path.clone(), revision);

        let entry = RegistryEntry {
            path,
            label,
            revision,
            module,
            instance,
        };

        match self.entries.iter().position(|e| e.path == entry.path) {
            Some(index) => {
                let old = std::mem::replace(&mut self.entries[index], entry);
                (revision, Some((old.module, old.instance)))
            }
            None => {
                self.entries.push(entry);
                (revision, None)
            }
        }
    }

    /// Withdraw the entry for an identity, if one is published.
    pub fn remove(&mut self, path: &Path) -> Option<(Module, LoadedScript)> {
        let index = self.entries.iter().position(|e| e.path == path)?;
        let entry = self.entries.remove(index);
        Some((entry.module, entry.instance))
    }

    /// Withdraw every entry, in no particular order; used at shutdown.
    pub fn drain(&mut self) -> Vec<(String, Module, LoadedScript)> {
        self.entries
            .drain(..)
            .map(|e| (e.label, e.module, e.instance))
            .collect()
    }

    /// Entries in insertion order, for the execution pass
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegistryEntry> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::engine::{create_engine, create_host_linker};

    fn fixture(label: &str) -> (PathBuf, Module, LoadedScript) {
        let engine = create_engine().unwrap();
        let linker = create_host_linker(&engine).unwrap();
        let path = PathBuf::from(format!("/scripts/{}.script.wat", label));
        let module = compile_source(
            &engine,
            &path,
            r#"(module (func (export "initialize")) (func (export "execute")))"#,
        )
        .unwrap();
        let instance = LoadedScript::instantiate(&engine, &linker, &module, label).unwrap();
        (path, module, instance)
    }

    #[test]
    fn at_most_one_entry_per_identity() {
        let mut registry = ScriptRegistry::new();
        let (path, module, instance) = fixture("a");
        registry.publish(path.clone(), "a".into(), module, instance);

        let (path2, module2, instance2) = fixture("a");
        assert_eq!(path, path2);
        let (revision, superseded) = registry.publish(path.clone(), "a".into(), module2, instance2);

        assert_eq!(registry.len(), 1);
        assert_eq!(revision, 2);
        assert!(superseded.is_some());
        assert_eq!(registry.revision_of(&path), Some(2));
    }

    #[test]
    fn revisions_survive_removal() {
        let mut registry = ScriptRegistry::new();
        let (path, module, instance) = fixture("a");
        registry.publish(path.clone(), "a".into(), module, instance);
        assert!(registry.remove(&path).is_some());
        assert!(!registry.contains(&path));

        let (_, module, instance) = fixture("a");
        let (revision, _) = registry.publish(path.clone(), "a".into(), module, instance);
        assert_eq!(revision, 2, "re-added identity continues its revision history");
    }

    #[test]
    fn reload_keeps_execution_order() {
        let mut registry = ScriptRegistry::new();
        for label in ["a", "b", "c"] {
            let (path, module, instance) = fixture(label);
            registry.publish(path, label.into(), module, instance);
        }

        let (path_b, module, instance) = fixture("b");
        registry.publish(path_b, "b".into(), module, instance);

        assert_eq!(registry.labels(), vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_unknown_identity_is_none() {
        let mut registry = ScriptRegistry::new();
        assert!(registry.remove(Path::new("/scripts/ghost.script.wat")).is_none());
    }
}
