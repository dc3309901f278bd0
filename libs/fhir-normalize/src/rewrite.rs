//! Recursive, context-sensitive rewriting of a bundle's JSON tree.
//!
//! Resolves `urn:uuid:` and identifier-based references into canonical
//! `ResourceType/id` form, removes references the target server would reject,
//! strips fields it refuses to store, and injects care-team provider and
//! provenance agent back-references.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::index::{IdentifierMap, URN_UUID_PREFIX};

/// Ancestor context threaded through the traversal.
///
/// Each flag is recomputed at every descent into a field and holds for
/// exactly one level unless the child re-triggers the same condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    /// Inside an `ExplanationOfBenefit.careTeam` array.
    pub in_eob_care_team: bool,
    /// Inside a `CarePlan.careTeam` array.
    pub in_careplan_care_team: bool,
    /// Inside a `Provenance.agent` array.
    pub in_provenance_agent: bool,
}

/// Outcome of resolving one `reference` string.
enum Resolution {
    /// Keep the string as-is.
    Keep,
    /// Replace the string with a canonical `ResourceType/id` form.
    Rewrite(String),
    /// Remove the whole enclosing object from its container.
    Remove,
}

/// Rewrites one document tree against a pair of read-only lookup maps.
pub struct Rewriter<'a> {
    uuid_types: &'a HashMap<String, String>,
    identifiers: &'a IdentifierMap,
    organization_id: Option<&'a str>,
    practitioner_id: Option<&'a str>,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        uuid_types: &'a HashMap<String, String>,
        identifiers: &'a IdentifierMap,
        organization_id: Option<&'a str>,
        practitioner_id: Option<&'a str>,
    ) -> Self {
        Self {
            uuid_types,
            identifiers,
            organization_id,
            practitioner_id,
        }
    }

    /// Rewrite one node. `None` means the node must be removed from its
    /// container: the field is deleted in object context, the element is
    /// dropped in list context.
    pub fn rewrite(&self, value: Value, ctx: Context) -> Option<Value> {
        match value {
            Value::Object(map) => self.rewrite_object(map, ctx),
            Value::Array(items) => Some(Value::Array(
                items
                    .into_iter()
                    .filter_map(|item| self.rewrite(item, ctx))
                    .collect(),
            )),
            scalar => Some(scalar),
        }
    }

    fn rewrite_object(&self, mut map: Map<String, Value>, ctx: Context) -> Option<Value> {
        // Resolve the object's own reference before anything else. An
        // unresolvable reference (other than urn:uuid form) removes the whole
        // object, so no injection or pruning may run for it.
        let resolution = match map.get("reference").and_then(Value::as_str) {
            Some(reference) => self.resolve_reference(reference),
            None => Resolution::Keep,
        };
        match resolution {
            Resolution::Keep => {}
            Resolution::Rewrite(resolved) => {
                map.insert("reference".to_string(), Value::String(resolved));
            }
            Resolution::Remove => return None,
        }

        if ctx.in_eob_care_team && !map.contains_key("provider") {
            if let Some(organization_id) = self.organization_id {
                map.insert(
                    "provider".to_string(),
                    json!({ "reference": format!("Organization/{organization_id}") }),
                );
                debug!("Added provider reference to ExplanationOfBenefit.careTeam member");
            }
        }

        if ctx.in_careplan_care_team && map.contains_key("reference") {
            // CarePlan.careTeam members may only carry `reference` and
            // `display` (FHIR R4 reference shape).
            map.retain(|key, _| matches!(key.as_str(), "reference" | "display"));
        }

        if ctx.in_provenance_agent && !map.contains_key("who") {
            if let Some(practitioner_id) = self.practitioner_id {
                map.insert(
                    "who".to_string(),
                    json!({ "reference": format!("Practitioner/{practitioner_id}") }),
                );
                debug!("Added who reference to Provenance agent");
            }
        }

        let resource_type = map
            .get("resourceType")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let resource_type = resource_type.as_deref();
        let is_observation = resource_type == Some("Observation");
        let is_careplan = resource_type == Some("CarePlan");
        let is_medication_request = resource_type == Some("MedicationRequest");
        let is_eob = resource_type == Some("ExplanationOfBenefit");
        let is_provenance = resource_type == Some("Provenance");

        // Consuming the map and rebuilding it in order gives the loop a
        // stable view of the fields while it deletes some of them.
        let mut rebuilt = Map::new();
        for (key, mut value) in map {
            if key == "period" {
                debug!("Removed 'period' block");
                continue;
            }
            if is_observation && key == "valueCodeableConcept" {
                debug!("Removed 'valueCodeableConcept' from Observation");
                continue;
            }
            if is_medication_request && key == "dosageInstruction" {
                if let Value::Array(items) = &mut value {
                    for item in items.iter_mut() {
                        if let Value::Object(dosage) = item {
                            if dosage.remove("additionalInstruction").is_some() {
                                debug!(
                                    "Removed 'additionalInstruction' from \
                                     MedicationRequest.dosageInstruction"
                                );
                            }
                        }
                    }
                }
            }

            let child_ctx = Context {
                in_eob_care_team: is_eob && key == "careTeam" && value.is_array(),
                in_careplan_care_team: is_careplan && key == "careTeam" && value.is_array(),
                in_provenance_agent: is_provenance && key == "agent" && value.is_array(),
            };

            match self.rewrite(value, child_ctx) {
                Some(rewritten) => {
                    rebuilt.insert(key, rewritten);
                }
                None => debug!(field = %key, "Removed field with unresolvable reference"),
            }
        }
        Some(Value::Object(rebuilt))
    }

    fn resolve_reference(&self, reference: &str) -> Resolution {
        if let Some(uuid) = reference.strip_prefix(URN_UUID_PREFIX) {
            return match self.uuid_types.get(uuid) {
                Some(resource_type) => {
                    let resolved = format!("{resource_type}/{uuid}");
                    debug!(from = %reference, to = %resolved, "Replaced urn:uuid reference");
                    Resolution::Rewrite(resolved)
                }
                None => {
                    warn!(uuid = %uuid, "UUID not found in bundle, leaving reference unchanged");
                    Resolution::Keep
                }
            };
        }

        if reference.contains("?identifier=") && reference.contains('|') {
            if let Some(captures) = identifier_query_regex().captures(reference) {
                let value = &captures[3];
                return match self.identifiers.get(value) {
                    Some(target) => {
                        let resolved = format!("{}/{}", target.resource_type, target.id);
                        debug!(from = %reference, to = %resolved, "Replaced identifier query reference");
                        Resolution::Rewrite(resolved)
                    }
                    None => {
                        debug!(reference = %reference, "Removing reference with unmapped identifier");
                        Resolution::Remove
                    }
                };
            }
            return Resolution::Keep;
        }

        if reference.starts_with('#') {
            debug!(reference = %reference, "Removing internal reference");
            return Resolution::Remove;
        }

        if let Some((_, id_part)) = reference.split_once('/') {
            if is_uuid_shaped(id_part) {
                return Resolution::Keep;
            }
            if let Some(target) = self.identifiers.get(id_part) {
                let resolved = format!("{}/{}", target.resource_type, target.id);
                debug!(from = %reference, to = %resolved, "Replaced identifier reference");
                return Resolution::Rewrite(resolved);
            }
            debug!(reference = %reference, "Removing invalid reference");
            return Resolution::Remove;
        }

        Resolution::Keep
    }
}

fn identifier_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\w+)\?identifier=([^|]+)\|(.+)").expect("identifier query regex must compile")
    })
}

/// Strict UUID shape: 8-4-4-4-12 hex groups separated by hyphens.
fn is_uuid_shaped(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("UUID shape regex must compile")
    });
    re.is_match(id)
}
