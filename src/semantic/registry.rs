use crate::error::RegistryError;
use crate::scene::{ObjectId, Rgb, BACKGROUND_COLOR};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Name of the reserved class unlabeled objects fall back to.
pub const UNDEFINED_CLASS_NAME: &str = "Undefined";
/// Sentinel color of the reserved class.
pub const UNDEFINED_CLASS_COLOR: Rgb = Rgb::WHITE;
pub const UNDEFINED_CLASS_ID: ClassId = ClassId(0);

const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user-defined label with a flat color unique within its registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticClass {
    pub id: ClassId,
    pub name: String,
    pub color: Rgb,
    pub members: IndexSet<ObjectId>,
}

impl SemanticClass {
    fn new(id: ClassId, name: String, color: Rgb) -> Self {
        Self {
            id,
            name,
            color,
            members: IndexSet::new(),
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.id == UNDEFINED_CLASS_ID
    }
}

/// Persisted form of the registry: class name to color, object to class name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: u32,
    pub classes: IndexMap<String, Rgb>,
    pub assignments: IndexMap<ObjectId, String>,
}

/// Maps semantic class names to colors and to the objects tagged with them.
///
/// Invariants:
/// - no two classes share a name or a color, and none uses the background color;
/// - an object belongs to at most one class;
/// - the reserved `Undefined` class always exists and never has members. Objects
///   without a class resolve to its color.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticClassRegistry {
    classes: IndexMap<ClassId, SemanticClass>,
    object_classes: HashMap<ObjectId, ClassId>,
    next_id: u32,
}

impl SemanticClassRegistry {
    pub fn new() -> Self {
        let mut classes = IndexMap::new();
        classes.insert(
            UNDEFINED_CLASS_ID,
            SemanticClass::new(
                UNDEFINED_CLASS_ID,
                UNDEFINED_CLASS_NAME.to_string(),
                UNDEFINED_CLASS_COLOR,
            ),
        );
        Self {
            classes,
            object_classes: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn define_class(
        &mut self,
        name: impl Into<String>,
        color: Rgb,
    ) -> Result<ClassId, RegistryError> {
        let name = name.into();
        Self::validate_name(&name)?;
        if self.class_by_name(&name).is_some() {
            return Err(RegistryError::DuplicateName(name));
        }
        self.ensure_color_free(color, None)?;

        let id = ClassId(self.next_id);
        self.next_id += 1;
        info!("Defined semantic class '{}' {} as {}", name, color, id);
        self.classes
            .insert(id, SemanticClass::new(id, name, color));
        Ok(id)
    }

    /// Moves `object` into `class`. Assigning to the reserved class clears the assignment.
    pub fn assign(&mut self, object: ObjectId, class: ClassId) -> Result<(), RegistryError> {
        if !self.classes.contains_key(&class) {
            return Err(RegistryError::UnknownClass(class));
        }
        if class == UNDEFINED_CLASS_ID {
            self.unassign(object);
            return Ok(());
        }
        if self.object_classes.get(&object) == Some(&class) {
            return Ok(());
        }

        self.unassign(object);
        if let Some(entry) = self.classes.get_mut(&class) {
            entry.members.insert(object);
        }
        self.object_classes.insert(object, class);
        debug!("Assigned object {} to class {}", object, class);
        Ok(())
    }

    /// Clears the object's class. Returns the class it belonged to.
    pub fn unassign(&mut self, object: ObjectId) -> Option<ClassId> {
        let previous = self.object_classes.remove(&object)?;
        if let Some(entry) = self.classes.get_mut(&previous) {
            entry.members.shift_remove(&object);
        }
        Some(previous)
    }

    /// Drops every trace of an object that left the scene.
    pub fn forget_object(&mut self, object: ObjectId) {
        if let Some(class) = self.unassign(object) {
            debug!("Forgot deleted object {} (was in {})", object, class);
        }
    }

    /// Forgets every object `keep` rejects, e.g. ids of a scene that was reloaded.
    /// Returns how many assignments were dropped.
    pub fn prune_objects(&mut self, keep: impl Fn(ObjectId) -> bool) -> usize {
        let stale: Vec<ObjectId> = self
            .object_classes
            .keys()
            .copied()
            .filter(|&object| !keep(object))
            .collect();
        for &object in &stale {
            self.forget_object(object);
        }
        if !stale.is_empty() {
            info!("Dropped {} stale class assignment(s)", stale.len());
        }
        stale.len()
    }

    pub fn color_of(&self, class: ClassId) -> Option<Rgb> {
        self.classes.get(&class).map(|entry| entry.color)
    }

    pub fn class_of(&self, object: ObjectId) -> Option<ClassId> {
        self.object_classes.get(&object).copied()
    }

    /// Color an object is painted with in the segmentation pass.
    pub fn resolve_color(&self, object: ObjectId) -> Rgb {
        self.class_of(object)
            .and_then(|class| self.color_of(class))
            .unwrap_or(UNDEFINED_CLASS_COLOR)
    }

    pub fn class(&self, class: ClassId) -> Option<&SemanticClass> {
        self.classes.get(&class)
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.classes
            .values()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Classes in definition order, the reserved class first.
    pub fn classes(&self) -> impl Iterator<Item = &SemanticClass> {
        self.classes.values()
    }

    pub fn members(&self, class: ClassId) -> Vec<ObjectId> {
        self.classes
            .get(&class)
            .map(|entry| entry.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of classes, the reserved one included.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.len() <= 1
    }

    pub fn rename_class(
        &mut self,
        class: ClassId,
        new_name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let new_name = new_name.into();
        let entry = self.user_class(class)?;
        if entry.name == new_name {
            return Ok(());
        }
        Self::validate_name(&new_name)?;
        if self.class_by_name(&new_name).is_some() {
            return Err(RegistryError::DuplicateName(new_name));
        }

        if let Some(entry) = self.classes.get_mut(&class) {
            info!("Renamed semantic class '{}' to '{}'", entry.name, new_name);
            entry.name = new_name;
        }
        Ok(())
    }

    pub fn recolor_class(&mut self, class: ClassId, color: Rgb) -> Result<(), RegistryError> {
        let entry = self.user_class(class)?;
        if entry.color == color {
            return Ok(());
        }
        self.ensure_color_free(color, Some(class))?;

        if let Some(entry) = self.classes.get_mut(&class) {
            info!(
                "Recolored semantic class '{}' from {} to {}",
                entry.name, entry.color, color
            );
            entry.color = color;
        }
        Ok(())
    }

    /// Removes a class. Its members become unassigned.
    pub fn remove_class(&mut self, class: ClassId) -> Result<(), RegistryError> {
        self.user_class(class)?;
        if let Some(entry) = self.classes.shift_remove(&class) {
            for object in &entry.members {
                self.object_classes.remove(object);
            }
            info!(
                "Removed semantic class '{}' ({} member(s) unassigned)",
                entry.name,
                entry.members.len()
            );
        }
        Ok(())
    }

    /// Removes every class except the reserved one.
    pub fn remove_all_classes(&mut self) {
        self.classes.retain(|id, _| *id == UNDEFINED_CLASS_ID);
        self.object_classes.clear();
    }

    pub fn serialize(&self) -> RegistryDocument {
        RegistryDocument {
            version: DOCUMENT_VERSION,
            classes: self
                .classes
                .values()
                .map(|entry| (entry.name.clone(), entry.color))
                .collect(),
            assignments: self
                .classes
                .values()
                .flat_map(|entry| {
                    entry
                        .members
                        .iter()
                        .map(move |object| (*object, entry.name.clone()))
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.serialize())
    }

    /// Replaces the registry with the document's contents.
    ///
    /// On any error the registry is left untouched.
    pub fn deserialize(&mut self, document: RegistryDocument) -> Result<(), RegistryError> {
        let restored = Self::from_document(document)?;
        *self = restored;
        Ok(())
    }

    pub fn deserialize_json(&mut self, json: &str) -> Result<(), RegistryError> {
        let document: RegistryDocument = serde_json::from_str(json)
            .map_err(|e| RegistryError::SchemaError(e.to_string()))?;
        self.deserialize(document)
    }

    pub fn from_document(document: RegistryDocument) -> Result<Self, RegistryError> {
        if document.version != DOCUMENT_VERSION {
            return Err(RegistryError::SchemaError(format!(
                "unsupported document version {}",
                document.version
            )));
        }

        let mut registry = Self::new();
        for (name, color) in document.classes {
            if name == UNDEFINED_CLASS_NAME {
                if color != UNDEFINED_CLASS_COLOR {
                    return Err(RegistryError::SchemaError(format!(
                        "reserved class '{}' must keep color {}",
                        UNDEFINED_CLASS_NAME, UNDEFINED_CLASS_COLOR
                    )));
                }
                continue;
            }
            registry
                .define_class(name, color)
                .map_err(|e| RegistryError::SchemaError(e.to_string()))?;
        }

        for (object, name) in document.assignments {
            let class = registry.class_by_name(&name).ok_or_else(|| {
                RegistryError::SchemaError(format!(
                    "object {} assigned to unknown class '{}'",
                    object, name
                ))
            })?;
            registry.assign(object, class)?;
        }

        Ok(registry)
    }

    fn user_class(&self, class: ClassId) -> Result<&SemanticClass, RegistryError> {
        let entry = self
            .classes
            .get(&class)
            .ok_or(RegistryError::UnknownClass(class))?;
        if entry.is_reserved() {
            warn!("Refusing to modify reserved class '{}'", entry.name);
            return Err(RegistryError::ReservedClass(entry.name.clone()));
        }
        Ok(entry)
    }

    fn ensure_color_free(&self, color: Rgb, except: Option<ClassId>) -> Result<(), RegistryError> {
        if color == BACKGROUND_COLOR {
            return Err(RegistryError::ReservedColor(color));
        }
        match self
            .classes
            .values()
            .find(|entry| entry.color == color && Some(entry.id) != except)
        {
            Some(existing) => Err(RegistryError::DuplicateColor {
                color,
                existing: existing.name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn validate_name(name: &str) -> Result<(), RegistryError> {
        if name.trim().is_empty() || name.contains(',') || name.contains('\n') {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        Ok(())
    }
}

impl Default for SemanticClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
