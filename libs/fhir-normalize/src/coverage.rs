//! Coverage synthesis for claim resources.
//!
//! The generator emits ExplanationOfBenefit entries without any Coverage for
//! `insurance.coverage` to point at, which strict servers reject. Each claim
//! gets a freshly generated Coverage inserted directly before it, tied to the
//! bundle's Patient and the configured payor Organization.

use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

/// Insert a Coverage entry before every ExplanationOfBenefit entry and wire
/// the claim's `insurance` to it, overwriting any prior value.
///
/// The beneficiary is the first Patient in the bundle; without one the bundle
/// is left untouched.
pub fn inject_coverage(bundle: &mut Value, organization_id: &str) {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return;
    }
    let Some(entries) = bundle.get_mut("entry").and_then(Value::as_array_mut) else {
        return;
    };

    let patient_id = entries.iter().find_map(|entry| {
        let resource = entry.get("resource")?;
        match resource.get("resourceType").and_then(Value::as_str) {
            Some("Patient") => resource.get("id").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        }
    });
    let Some(patient_id) = patient_id else {
        warn!("No Patient resource found, skipping Coverage injection");
        return;
    };

    let mut rebuilt = Vec::with_capacity(entries.len());
    for mut entry in entries.drain(..) {
        let is_claim = entry
            .get("resource")
            .and_then(|resource| resource.get("resourceType"))
            .and_then(Value::as_str)
            == Some("ExplanationOfBenefit");
        if is_claim {
            let coverage_id = Uuid::new_v4().to_string();
            rebuilt.push(coverage_entry(&coverage_id, &patient_id, organization_id));
            if let Some(resource) = entry.get_mut("resource").and_then(Value::as_object_mut) {
                resource.insert(
                    "insurance".to_string(),
                    json!([{
                        "focal": true,
                        "coverage": { "reference": format!("Coverage/{coverage_id}") }
                    }]),
                );
            }
            debug!(coverage_id = %coverage_id, "Added Coverage for ExplanationOfBenefit");
        }
        rebuilt.push(entry);
    }
    *entries = rebuilt;
}

fn coverage_entry(coverage_id: &str, patient_id: &str, organization_id: &str) -> Value {
    json!({
        "fullUrl": format!("urn:uuid:{coverage_id}"),
        "resource": {
            "resourceType": "Coverage",
            "id": coverage_id,
            "status": "active",
            "beneficiary": { "reference": format!("Patient/{patient_id}") },
            "payor": [
                { "reference": format!("Organization/{organization_id}") }
            ]
        },
        "request": {
            "method": "POST",
            "url": "Coverage"
        }
    })
}
