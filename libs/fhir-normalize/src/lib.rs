//! Normalization of Synthea-generated FHIR bundles for server ingestion.
//!
//! Synthea emits transaction bundles whose entries reference each other by
//! bundle-scoped `urn:uuid:` URLs and by business identifiers. Servers with
//! strict referential rules want canonical `ResourceType/id` references, no
//! contained-resource pointers, and a handful of fields they refuse to store
//! stripped out. This crate rewrites a batch of bundle documents accordingly:
//!
//! - [`build_reference_index`] indexes one bundle's UUIDs and identifiers.
//! - [`aggregate_identifiers`] merges identifier mappings across the whole
//!   batch so references into other files resolve too.
//! - [`process_bundle`] injects Coverage linkage resources and rewrites the
//!   document tree in a single depth-first pass.
//!
//! Processing is strictly sequential: the aggregation pass must complete
//! before any document is rewritten, because a document's own identifier
//! mappings override the batch-wide ones on collision.

pub mod coverage;
pub mod error;
pub mod index;
pub mod options;
pub mod organization;
pub mod rewrite;

pub use coverage::inject_coverage;
pub use error::{Error, Result};
pub use index::{
    aggregate_identifiers, build_reference_index, load_document, IdentifierMap, IdentifierTarget,
    ReferenceIndex,
};
pub use options::{NormalizeOptions, DEFAULT_ORGANIZATION_ID, DEFAULT_PRACTITIONER_ID};
pub use organization::{ensure_organization_bundle, organization_bundle, ORGANIZATION_FILE_NAME};
pub use rewrite::{Context, Rewriter};

use serde_json::Value;

/// Normalize one bundle document against the batch-wide identifier map.
///
/// Identifier lookups prefer the document's own mappings over `global`
/// entries collected from other files. The Coverage injector runs before the
/// tree rewrite so the synthesized entries are part of the rewritten output.
pub fn process_bundle(
    document: Value,
    global: &IdentifierMap,
    options: &NormalizeOptions,
) -> Value {
    let index = build_reference_index(&document);

    let mut identifiers = global.clone();
    identifiers.extend(index.identifiers);

    let mut document = document;
    inject_coverage(&mut document, &options.organization_id);

    let rewriter = Rewriter::new(
        &index.uuid_types,
        &identifiers,
        Some(&options.organization_id),
        Some(&options.practitioner_id),
    );
    // A Bundle root carries no `reference` field, so the rewrite never
    // removes it.
    rewriter
        .rewrite(document, Context::default())
        .unwrap_or_default()
}
