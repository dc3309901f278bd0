//! Organization seed bundle written next to the batch on first run.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::info;

/// File name of the seeded Organization bundle inside the batch directory.
pub const ORGANIZATION_FILE_NAME: &str = "organizationInformation.json";

/// Batch Bundle holding the single payor/provider Organization that the
/// rewritten bundles refer to.
pub fn organization_bundle(organization_id: &str) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "batch",
        "entry": [
            {
                "fullUrl": format!("urn:uuid:{organization_id}"),
                "resource": {
                    "resourceType": "Organization",
                    "id": organization_id,
                    "active": true,
                    "type": [
                        {
                            "coding": [
                                {
                                    "system": "http://terminology.hl7.org/CodeSystem/organization-type",
                                    "code": "prov",
                                    "display": "Healthcare Provider"
                                }
                            ]
                        }
                    ],
                    "name": "Healthcare Organization"
                },
                "request": {
                    "method": "POST",
                    "url": "Organization"
                }
            }
        ]
    })
}

/// Write the Organization bundle into `dir` unless it already exists.
///
/// Returns the path of the newly written file, or `None` when a previous run
/// already created it.
pub fn ensure_organization_bundle(
    dir: &Path,
    organization_id: &str,
) -> crate::Result<Option<PathBuf>> {
    let path = dir.join(ORGANIZATION_FILE_NAME);
    if path.exists() {
        info!(path = %path.display(), "Organization bundle already exists");
        return Ok(None);
    }
    let bundle = organization_bundle(organization_id);
    fs::write(&path, format!("{}\n", serde_json::to_string_pretty(&bundle)?))?;
    info!(path = %path.display(), "Created Organization bundle");
    Ok(Some(path))
}
