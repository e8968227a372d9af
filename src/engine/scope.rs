//! Call scopes and symbol resolution.

use crate::language::Command;
use crate::shaft::DeviceId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Symbol table mapping program names to devices.
///
/// The base table holds every device id. Function calls layer one
/// parameter binding at a time over a shared chain, so entering a scope
/// costs a single small allocation no matter how many symbols exist, and
/// every caller symbol stays visible through the overlay.
#[derive(Debug, Clone)]
pub struct Symbols {
    base: Arc<BTreeMap<String, DeviceId>>,
    overlay: Option<Arc<Binding>>,
}

#[derive(Debug)]
struct Binding {
    name: String,
    device: DeviceId,
    parent: Option<Arc<Binding>>,
}

impl Symbols {
    /// Build the root table: each device id names itself.
    pub fn from_devices(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        let base = devices
            .into_iter()
            .map(|device| (device.0.clone(), device))
            .collect();
        Self {
            base: Arc::new(base),
            overlay: None,
        }
    }

    /// Resolve a name, innermost binding first.
    pub fn resolve(&self, name: &str) -> Option<&DeviceId> {
        let mut binding = self.overlay.as_deref();
        while let Some(bound) = binding {
            if bound.name == name {
                return Some(&bound.device);
            }
            binding = bound.parent.as_deref();
        }
        self.base.get(name)
    }

    /// A new table with one extra binding shadowing any same-named one.
    pub fn with_binding(&self, name: String, device: DeviceId) -> Symbols {
        Self {
            base: Arc::clone(&self.base),
            overlay: Some(Arc::new(Binding {
                name,
                device,
                parent: self.overlay.clone(),
            })),
        }
    }
}

/// One frame of the execution stack.
#[derive(Debug, Clone)]
pub struct Scope {
    commands: Arc<[Command]>,
    symbols: Symbols,
    pc: usize,
}

impl Scope {
    /// A fresh frame at the first command.
    pub fn new(commands: Arc<[Command]>, symbols: Symbols) -> Self {
        Self {
            commands,
            symbols,
            pc: 0,
        }
    }

    /// This frame's symbol table.
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Step past the current command.
    pub fn advance_pc(&mut self) {
        self.pc += 1;
    }

    /// True once every command has been executed.
    pub fn exhausted(&self) -> bool {
        self.pc >= self.commands.len()
    }

    /// The command the program counter rests on.
    pub fn current_command(&self) -> Option<&Command> {
        self.commands.get(self.pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[test]
    fn base_table_resolves_device_names() {
        let symbols = Symbols::from_devices([device("A"), device("B")]);
        assert_eq!(symbols.resolve("A"), Some(&device("A")));
        assert_eq!(symbols.resolve("B"), Some(&device("B")));
        assert_eq!(symbols.resolve("X"), None);
    }

    #[test]
    fn bindings_shadow_without_touching_the_parent() {
        let root = Symbols::from_devices([device("A"), device("B")]);
        let inner = root.with_binding("X".to_string(), device("A"));

        assert_eq!(inner.resolve("X"), Some(&device("A")));
        assert_eq!(inner.resolve("B"), Some(&device("B")));
        assert_eq!(root.resolve("X"), None);

        // Rebinding in a deeper frame shadows the outer binding only there.
        let deeper = inner.with_binding("X".to_string(), device("B"));
        assert_eq!(deeper.resolve("X"), Some(&device("B")));
        assert_eq!(inner.resolve("X"), Some(&device("A")));
    }

    #[test]
    fn scope_walks_its_commands() {
        let commands: Arc<[Command]> = vec![Command::Restart, Command::Restart].into();
        let mut scope = Scope::new(commands, Symbols::from_devices([device("A")]));

        assert!(!scope.exhausted());
        assert_eq!(scope.current_command(), Some(&Command::Restart));
        scope.advance_pc();
        scope.advance_pc();
        assert!(scope.exhausted());
        assert_eq!(scope.current_command(), None);
    }
}
