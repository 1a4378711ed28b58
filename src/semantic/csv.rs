use super::registry::{SemanticClassRegistry, UNDEFINED_CLASS_COLOR, UNDEFINED_CLASS_NAME};
use crate::error::RegistryError;
use crate::scene::Rgb;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SEMANTIC_CLASSES_FILE_NAME: &str = "semantic_classes.csv";

/// Renders the class table as `name,R,G,B` lines, in definition order.
pub fn classes_to_csv(registry: &SemanticClassRegistry) -> String {
    registry
        .classes()
        .map(|class| {
            format!(
                "{},{},{},{}\n",
                class.name, class.color.r, class.color.g, class.color.b
            )
        })
        .collect()
}

/// Writes `semantic_classes.csv` into `directory` and returns its path.
pub async fn write_classes_csv(
    registry: &SemanticClassRegistry,
    directory: &Path,
) -> std::io::Result<PathBuf> {
    let path = directory.join(SEMANTIC_CLASSES_FILE_NAME);
    tokio::fs::write(&path, classes_to_csv(registry)).await?;
    info!("Wrote semantic class table to {}", path.display());
    Ok(path)
}

/// Replaces every user class with the ones listed in `content`.
///
/// Existing object assignments are dropped. On error the registry is unchanged.
pub fn import_classes_csv(
    registry: &mut SemanticClassRegistry,
    content: &str,
) -> Result<usize, RegistryError> {
    let mut imported = registry.clone();
    imported.remove_all_classes();
    let mut count = 0;

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, color) = parse_line(line).ok_or_else(|| {
            RegistryError::SchemaError(format!(
                "line {}: expected \"name,R,G,B\", got \"{}\"",
                line_number + 1,
                line
            ))
        })?;

        if name == UNDEFINED_CLASS_NAME {
            if color != UNDEFINED_CLASS_COLOR {
                warn!("Ignoring color override for reserved class '{}'", name);
            }
            continue;
        }
        imported
            .define_class(name, color)
            .map_err(|e| RegistryError::SchemaError(format!("line {}: {}", line_number + 1, e)))?;
        count += 1;
    }

    *registry = imported;
    info!("Imported {} semantic class(es)", count);
    Ok(count)
}

fn parse_line(line: &str) -> Option<(&str, Rgb)> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [name, r, g, b] => Some((
            *name,
            Rgb::new(r.parse().ok()?, g.parse().ok()?, b.parse().ok()?),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ObjectId;

    #[test]
    fn test_export_lists_reserved_class_first() {
        let mut registry = SemanticClassRegistry::new();
        registry.define_class("car", Rgb::new(255, 0, 0)).unwrap();

        assert_eq!(
            classes_to_csv(&registry),
            "Undefined,255,255,255\ncar,255,0,0\n"
        );
    }

    #[test]
    fn test_import_replaces_classes() {
        let mut registry = SemanticClassRegistry::new();
        let old = registry.define_class("old", Rgb::new(1, 1, 1)).unwrap();
        let object = ObjectId::new();
        registry.assign(object, old).unwrap();

        let count =
            import_classes_csv(&mut registry, "Undefined,255,255,255\nroad, 128, 64, 128\n\nsky,70,130,180\n")
                .unwrap();

        assert_eq!(count, 2);
        assert!(registry.class_by_name("old").is_none());
        assert_eq!(registry.class_of(object), None);
        let road = registry.class_by_name("road").unwrap();
        assert_eq!(registry.color_of(road), Some(Rgb::new(128, 64, 128)));
    }

    #[test]
    fn test_malformed_import_keeps_registry() {
        let mut registry = SemanticClassRegistry::new();
        registry.define_class("car", Rgb::new(255, 0, 0)).unwrap();
        let before = registry.clone();

        let short_line = import_classes_csv(&mut registry, "road,1,2\n");
        let out_of_range = import_classes_csv(&mut registry, "road,1,2,300\n");
        let duplicate = import_classes_csv(&mut registry, "a,1,2,3\nb,1,2,3\n");

        assert!(matches!(short_line, Err(RegistryError::SchemaError(_))));
        assert!(matches!(out_of_range, Err(RegistryError::SchemaError(_))));
        assert!(matches!(duplicate, Err(RegistryError::SchemaError(_))));
        assert_eq!(registry, before);
    }

    #[tokio::test]
    async fn test_write_classes_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SemanticClassRegistry::new();

        let path = write_classes_csv(&registry, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join(SEMANTIC_CLASSES_FILE_NAME));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "Undefined,255,255,255\n");
    }
}
