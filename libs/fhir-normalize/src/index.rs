//! Bundle-local reference indexes and cross-file identifier aggregation.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

pub(crate) const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Canonical target of an identifier-based lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTarget {
    pub resource_type: String,
    pub id: String,
}

/// Mapping from identifier value to the resource that carries it.
pub type IdentifierMap = HashMap<String, IdentifierTarget>;

/// Per-bundle lookup tables used during reference rewriting.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    /// Bundle-scoped UUID (from `entry.fullUrl`) to resource type.
    /// Never shared across documents: a `urn:uuid:` reference only has
    /// meaning inside the bundle that issued it.
    pub uuid_types: HashMap<String, String>,
    /// Identifier value to target resource, local to this bundle.
    pub identifiers: IdentifierMap,
}

/// Build the UUID and identifier indexes for one bundle.
///
/// Non-Bundle roots and bundles without an `entry` array produce empty maps.
pub fn build_reference_index(document: &Value) -> ReferenceIndex {
    let mut index = ReferenceIndex::default();
    for entry in bundle_entries(document) {
        let resource = entry.get("resource");

        if let Some(uuid) = entry
            .get("fullUrl")
            .and_then(Value::as_str)
            .and_then(|url| url.strip_prefix(URN_UUID_PREFIX))
        {
            if let Some(resource_type) = resource
                .and_then(|r| r.get("resourceType"))
                .and_then(Value::as_str)
            {
                index
                    .uuid_types
                    .insert(uuid.to_string(), resource_type.to_string());
            }
        }

        if let Some(resource) = resource {
            collect_resource_identifiers(resource, &mut index.identifiers);
        }
    }
    index
}

/// Merge identifier mappings from every document in the batch.
///
/// References can point at resources defined in a different file than the one
/// being rewritten; the merged map is what makes those resolvable. Files that
/// cannot be read or parsed contribute nothing and do not abort the
/// aggregation.
pub fn aggregate_identifiers<P: AsRef<Path>>(paths: &[P]) -> IdentifierMap {
    let mut identifiers = IdentifierMap::new();
    for path in paths {
        let path = path.as_ref();
        match load_document(path) {
            Ok(document) => {
                for entry in bundle_entries(&document) {
                    if let Some(resource) = entry.get("resource") {
                        collect_resource_identifiers(resource, &mut identifiers);
                    }
                }
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Skipping document during identifier aggregation"
                );
            }
        }
    }
    debug!(entries = identifiers.len(), "Built global identifier map");
    identifiers
}

/// Read and parse one JSON document.
pub fn load_document(path: &Path) -> crate::Result<Value> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn bundle_entries(document: &Value) -> impl Iterator<Item = &Value> {
    let entries = match document.get("resourceType").and_then(Value::as_str) {
        Some("Bundle") => document.get("entry").and_then(Value::as_array),
        _ => None,
    };
    entries.map(|entries| entries.iter()).into_iter().flatten()
}

/// Record `identifier[].value` -> (resource type, id) for one resource.
/// Last write wins when a value repeats.
fn collect_resource_identifiers(resource: &Value, out: &mut IdentifierMap) {
    let (Some(resource_type), Some(id)) = (
        resource.get("resourceType").and_then(Value::as_str),
        resource.get("id").and_then(Value::as_str),
    ) else {
        return;
    };
    let Some(identifiers) = resource.get("identifier").and_then(Value::as_array) else {
        return;
    };
    for identifier in identifiers {
        if let Some(value) = identifier.get("value").and_then(Value::as_str) {
            if !value.is_empty() {
                out.insert(
                    value.to_string(),
                    IdentifierTarget {
                        resource_type: resource_type.to_string(),
                        id: id.to_string(),
                    },
                );
            }
        }
    }
}
