pub mod csv;
pub mod registry;
pub mod store;

pub use csv::{
    classes_to_csv, import_classes_csv, write_classes_csv, SEMANTIC_CLASSES_FILE_NAME,
};
pub use registry::{
    ClassId, RegistryDocument, SemanticClass, SemanticClassRegistry, UNDEFINED_CLASS_COLOR,
    UNDEFINED_CLASS_ID, UNDEFINED_CLASS_NAME,
};
pub use store::RegistryStore;

use std::sync::{Arc, RwLock};

pub type SharedRegistry = Arc<RwLock<SemanticClassRegistry>>;
