//! Registry of loaded cogs.
//!
//! The loaded set decides which commands may run and which listeners receive
//! events. The lock is never held across an `.await`.

use crate::cogs::{Cog, EventKind, ExtensionSpec, Listener};
use crate::error::ExtensionError;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

struct Loaded {
    name: String,
    cog: Arc<Cog>,
}

pub struct Extensions {
    catalog: Vec<ExtensionSpec>,
    loaded: RwLock<Vec<Loaded>>,
}

impl Extensions {
    pub fn new(catalog: Vec<ExtensionSpec>) -> Self {
        Self {
            catalog,
            loaded: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Loaded>> {
        self.loaded.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Loaded>> {
        self.loaded.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Qualified names of every cataloged cog.
    pub fn available(&self) -> Vec<&'static str> {
        self.catalog.iter().map(|spec| spec.name).collect()
    }

    /// Qualified names of loaded cogs, in load order.
    pub fn loaded_names(&self) -> Vec<String> {
        self.read().iter().map(|l| l.name.clone()).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().iter().any(|l| l.name == name)
    }

    fn build(&self, name: &str) -> Result<Cog, ExtensionError> {
        let spec = self
            .catalog
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;

        (spec.setup)().map_err(|e| ExtensionError::Setup {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load every cataloged cog in order, stopping at the first failure.
    pub fn load_all(&self) -> Result<usize, ExtensionError> {
        for name in self.available() {
            self.load(name)?;
        }
        Ok(self.read().len())
    }

    pub fn load(&self, name: &str) -> Result<(), ExtensionError> {
        if self.is_loaded(name) {
            return Err(ExtensionError::AlreadyLoaded(name.to_string()));
        }
        let cog = self.build(name)?;

        let mut loaded = self.write();
        if loaded.iter().any(|l| l.name == name) {
            return Err(ExtensionError::AlreadyLoaded(name.to_string()));
        }
        check_conflicts(&loaded, name, &cog)?;

        info!(
            extension = name,
            cog = cog.name(),
            commands = cog.commands().len(),
            listeners = cog.listeners().len(),
            "Extension loaded"
        );
        loaded.push(Loaded {
            name: name.to_string(),
            cog: Arc::new(cog),
        });
        Ok(())
    }

    pub fn unload(&self, name: &str) -> Result<(), ExtensionError> {
        let mut loaded = self.write();
        let idx = loaded
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
        let removed = loaded.remove(idx);
        info!(extension = name, cog = removed.cog.name(), "Extension unloaded");
        Ok(())
    }

    /// Replace a loaded cog with a fresh instance.
    ///
    /// The replacement is built before the old instance is touched; if that
    /// fails the old instance stays active.
    pub fn reload(&self, name: &str) -> Result<(), ExtensionError> {
        if !self.is_loaded(name) {
            return Err(ExtensionError::NotLoaded(name.to_string()));
        }
        let cog = self.build(name)?;

        let mut loaded = self.write();
        let idx = loaded
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| ExtensionError::NotLoaded(name.to_string()))?;
        check_conflicts(&loaded, name, &cog)?;

        loaded[idx].cog = Arc::new(cog);
        info!(extension = name, "Extension reloaded");
        Ok(())
    }

    /// Owning extension of an active command.
    pub fn owner_of(&self, command: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|l| l.cog.command_names().any(|c| c == command))
            .map(|l| l.name.clone())
    }

    pub fn is_command_active(&self, command: &str) -> bool {
        self.owner_of(command).is_some()
    }

    /// Names of every active command, sorted.
    pub fn active_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .iter()
            .flat_map(|l| l.cog.command_names().map(str::to_string).collect::<Vec<_>>())
            .collect();
        names.sort();
        names
    }

    /// Every active listener as `(extension, event)`, in load order.
    pub fn active_listeners(&self) -> Vec<(String, EventKind)> {
        self.read()
            .iter()
            .flat_map(|l| {
                l.cog
                    .listeners()
                    .iter()
                    .map(|listener| (l.name.clone(), listener.event()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Snapshot of the listeners subscribed to `kind`.
    pub fn listeners_for(&self, kind: EventKind) -> Vec<(String, Arc<dyn Listener>)> {
        self.read()
            .iter()
            .flat_map(|l| {
                l.cog
                    .listeners()
                    .iter()
                    .filter(|listener| listener.event() == kind)
                    .map(|listener| (l.name.clone(), Arc::clone(listener)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Snapshot of the loaded cogs, in load order.
    pub fn cogs(&self) -> Vec<Arc<Cog>> {
        self.read().iter().map(|l| Arc::clone(&l.cog)).collect()
    }
}

fn check_conflicts(loaded: &[Loaded], name: &str, cog: &Cog) -> Result<(), ExtensionError> {
    for other in loaded.iter().filter(|l| l.name != name) {
        if let Some(command) = cog
            .command_names()
            .find(|c| other.cog.command_names().any(|o| o == *c))
        {
            return Err(ExtensionError::CommandConflict {
                extension: name.to_string(),
                command: command.to_string(),
                owner: other.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cogs::{self, ReadyLog};
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, Ordering};

    static FLAKY_BROKEN: AtomicBool = AtomicBool::new(false);

    fn flaky() -> Result<Cog, Error> {
        if FLAKY_BROKEN.load(Ordering::SeqCst) {
            return Err(Error::Config("FLAKY_TOKEN is not set".into()));
        }
        Ok(Cog::new("FlakyCog").listener(ReadyLog::new("FlakyCog")))
    }

    fn duplicate_ping() -> Result<Cog, Error> {
        Ok(Cog::new("DuplicateCog").command(cogs::test::ping()))
    }

    fn broken() -> Result<Cog, Error> {
        Err(Error::Config("broken on purpose".into()))
    }

    fn registry() -> Extensions {
        let mut catalog = cogs::catalog();
        catalog.push(ExtensionSpec {
            name: "cogs.duplicate",
            setup: duplicate_ping,
        });
        catalog.push(ExtensionSpec {
            name: "cogs.broken",
            setup: broken,
        });
        Extensions::new(catalog)
    }

    #[test]
    fn load_then_unload_restores_active_set() {
        let ext = registry();
        ext.load("cogs.events").unwrap();
        let commands_before = ext.active_commands();
        let listeners_before = ext.active_listeners();

        for name in ["cogs.test", "cogs.duplicate"] {
            ext.load(name).unwrap();
            ext.unload(name).unwrap();
            assert_eq!(ext.active_commands(), commands_before);
            assert_eq!(ext.active_listeners(), listeners_before);
        }
    }

    #[test]
    fn loading_activates_commands_and_listeners() {
        let ext = registry();
        ext.load("cogs.test").unwrap();
        assert_eq!(ext.active_commands(), vec!["ping".to_string()]);
        assert_eq!(ext.owner_of("ping").as_deref(), Some("cogs.test"));
        assert_eq!(
            ext.active_listeners(),
            vec![("cogs.test".to_string(), EventKind::Ready)]
        );
        assert_eq!(ext.listeners_for(EventKind::Ready).len(), 1);
        assert!(ext.listeners_for(EventKind::Message).is_empty());
    }

    #[test]
    fn one_entry_per_name() {
        let ext = registry();
        ext.load("cogs.test").unwrap();
        assert!(matches!(
            ext.load("cogs.test"),
            Err(ExtensionError::AlreadyLoaded(_))
        ));
        assert_eq!(ext.loaded_names(), vec!["cogs.test".to_string()]);
    }

    #[test]
    fn unknown_and_unloaded_names_are_reported() {
        let ext = registry();
        assert!(matches!(ext.load("cogs.nope"), Err(ExtensionError::NotFound(_))));
        assert!(matches!(ext.unload("cogs.test"), Err(ExtensionError::NotLoaded(_))));
        assert!(matches!(ext.reload("cogs.test"), Err(ExtensionError::NotLoaded(_))));
    }

    #[test]
    fn failing_setup_leaves_nothing_behind() {
        let ext = registry();
        let err = ext.load("cogs.broken").unwrap_err();
        assert!(err.to_string().contains("broken on purpose"));
        assert!(ext.loaded_names().is_empty());
    }

    #[test]
    fn conflicting_command_names_are_rejected() {
        let ext = registry();
        ext.load("cogs.test").unwrap();
        let err = ext.load("cogs.duplicate").unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::CommandConflict { ref command, ref owner, .. }
                if command == "ping" && owner == "cogs.test"
        ));
        assert!(!ext.is_loaded("cogs.duplicate"));
    }

    #[test]
    fn failed_reload_keeps_old_instance() {
        let ext = Extensions::new(vec![ExtensionSpec {
            name: "cogs.flaky",
            setup: flaky,
        }]);
        FLAKY_BROKEN.store(false, Ordering::SeqCst);
        ext.load("cogs.flaky").unwrap();
        let before = ext.cogs();

        FLAKY_BROKEN.store(true, Ordering::SeqCst);
        assert!(matches!(
            ext.reload("cogs.flaky"),
            Err(ExtensionError::Setup { .. })
        ));
        assert!(ext.is_loaded("cogs.flaky"));
        assert!(Arc::ptr_eq(&before[0], &ext.cogs()[0]));

        FLAKY_BROKEN.store(false, Ordering::SeqCst);
        ext.reload("cogs.flaky").unwrap();
        assert!(!Arc::ptr_eq(&before[0], &ext.cogs()[0]));
        assert_eq!(ext.loaded_names(), vec!["cogs.flaky".to_string()]);
    }

    #[test]
    fn load_all_follows_catalog_order() {
        let ext = Extensions::new(cogs::catalog());
        assert_eq!(ext.load_all().unwrap(), 2);
        assert_eq!(
            ext.loaded_names(),
            vec!["cogs.events".to_string(), "cogs.test".to_string()]
        );
    }

    #[test]
    fn load_all_stops_at_first_failure() {
        let ext = registry();
        assert!(matches!(
            ext.load_all(),
            Err(ExtensionError::CommandConflict { .. })
        ));
        assert_eq!(
            ext.loaded_names(),
            vec!["cogs.events".to_string(), "cogs.test".to_string()]
        );
        assert!(!ext.is_loaded("cogs.broken"));
    }
}
