//! Configuration for bundle normalization.

use serde::Deserialize;

/// Organization id used for injected payor and care-team provider references
/// when no override is configured.
pub const DEFAULT_ORGANIZATION_ID: &str = "2befa435-3070-3350-a15c-e43ac1e84b24";

/// Practitioner id used for injected Provenance agent references when no
/// override is configured.
pub const DEFAULT_PRACTITIONER_ID: &str = "a8cd062d-7100-36d2-96c0-a6a3903991ad";

/// Identifying constants wired into rewritten bundles.
///
/// Both ids must exist on the target server before the normalized bundles are
/// submitted; the Organization is seeded by
/// [`ensure_organization_bundle`](crate::ensure_organization_bundle).
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeOptions {
    /// Target of injected `payor` and care-team `provider` references.
    #[serde(default = "default_organization_id")]
    pub organization_id: String,
    /// Target of injected Provenance agent `who` references.
    #[serde(default = "default_practitioner_id")]
    pub practitioner_id: String,
}

fn default_organization_id() -> String {
    DEFAULT_ORGANIZATION_ID.to_string()
}

fn default_practitioner_id() -> String {
    DEFAULT_PRACTITIONER_ID.to_string()
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            organization_id: default_organization_id(),
            practitioner_id: default_practitioner_id(),
        }
    }
}
