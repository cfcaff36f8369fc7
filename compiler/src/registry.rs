// registry.rs — Actor class registry
//
// Network connections are resolved against actor class interfaces: the
// typed input and output ports of each class. Classes are loaded from JSON
// interface files or registered directly from actor IR.
//
// Preconditions: none.
// Postconditions: class names are unique; classes keep registration order.
// Failure modes: unreadable files, malformed JSON, duplicate names →
//                `RegistryError`.
// Side effects: reads interface files.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::actor::{Actor, Port};

// ── Data types ──────────────────────────────────────────────────────────────

/// The externally visible interface of an actor class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorClass {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
}

impl ActorClass {
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

impl From<&Actor> for ActorClass {
    fn from(actor: &Actor) -> Self {
        Self {
            name: actor.name.clone(),
            inputs: actor.inputs.clone(),
            outputs: actor.outputs.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("duplicate actor class '{0}'")]
    Duplicate(String),
}

/// Interface files hold either one class or a list of classes.
#[derive(Deserialize)]
#[serde(untagged)]
enum InterfaceFile {
    Many(Vec<ActorClass>),
    One(ActorClass),
}

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registry {
    classes: IndexMap<String, ActorClass>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ActorClass) -> Result<(), RegistryError> {
        if self.classes.contains_key(&class.name) {
            return Err(RegistryError::Duplicate(class.name));
        }
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    /// Register the interface of an actor in IR form.
    pub fn register_actor(&mut self, actor: &Actor) -> Result<(), RegistryError> {
        self.register(ActorClass::from(actor))
    }

    /// Parse interface JSON. Returns the number of classes added.
    pub fn load_str(&mut self, text: &str, path: &Path) -> Result<usize, RegistryError> {
        let file: InterfaceFile = serde_json::from_str(text).map_err(|source| RegistryError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let classes = match file {
            InterfaceFile::Many(classes) => classes,
            InterfaceFile::One(class) => vec![class],
        };
        let count = classes.len();
        for class in classes {
            self.register(class)?;
        }
        Ok(count)
    }

    /// Load an interface file. Returns the number of classes added.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&text, path)
    }

    pub fn lookup(&self, name: &str) -> Option<&ActorClass> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ActorClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Compact JSON of all classes sorted by name, independent of
    /// registration order.
    pub fn canonical_json(&self) -> String {
        let mut classes: Vec<&ActorClass> = self.classes.values().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::to_string(&classes).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    const CLASSES: &str = r#"[
        {"name": "Source", "outputs": [{"name": "out", "type": "int16"}]},
        {"name": "Sink", "inputs": [{"name": "in", "type": "int16"}]}
    ]"#;

    #[test]
    fn load_list_and_single() {
        let mut reg = Registry::new();
        assert_eq!(reg.load_str(CLASSES, Path::new("a.json")).unwrap(), 2);
        let single = r#"{"name": "Mid", "inputs": [{"name": "x", "type": "uint8"}]}"#;
        assert_eq!(reg.load_str(single, Path::new("b.json")).unwrap(), 1);
        assert_eq!(reg.len(), 3);
        let src = reg.lookup("Source").unwrap();
        assert_eq!(src.output("out").unwrap().ty, Type::Int(16));
        assert!(src.input("out").is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut reg = Registry::new();
        reg.load_str(CLASSES, Path::new("a.json")).unwrap();
        let err = reg.load_str(CLASSES, Path::new("a.json")).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(ref n) if n == "Source"));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let err = Registry::new().load_str("{", Path::new("bad.json")).unwrap_err();
        assert!(err.to_string().starts_with("bad.json: "));
    }

    #[test]
    fn register_actor_copies_ports() {
        let mut actor = Actor::new("Gain");
        actor.inputs.push(Port::new("in", Type::Int(16)));
        actor.outputs.push(Port::new("out", Type::Int(32)));
        let mut reg = Registry::new();
        reg.register_actor(&actor).unwrap();
        assert_eq!(reg.lookup("Gain").unwrap().outputs[0].ty, Type::Int(32));
    }

    #[test]
    fn canonical_json_ignores_registration_order() {
        let mut a = Registry::new();
        a.load_str(CLASSES, Path::new("a.json")).unwrap();
        let mut b = Registry::new();
        for class in a.classes().cloned().collect::<Vec<_>>().into_iter().rev() {
            b.register(class).unwrap();
        }
        assert_eq!(a.canonical_json(), b.canonical_json());
    }
}
