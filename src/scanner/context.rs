use async_trait::async_trait;

use crate::render::{PetContext, VaultEntryContext};
use crate::domain::{GeoPoint, User};

/// Resolves the "include-in-alert" side payloads the scanner embeds in a
/// rendered alert (spec §4.E step 5): personal message, pets, vault entries,
/// and — gated on `location_consent` — a recent location. All of this data
/// is owned by CRUD surfaces the engine never writes (spec §1 Non-goals), so
/// it is read through an injected trait the way the scanner's other
/// collaborators (the clock, the queue, the consent gate) are injected
/// (spec §9's "components must be constructible with injected dependencies").
#[async_trait]
pub trait AlertContextProvider: Send + Sync + 'static {
    async fn personal_message(&self, user: &User) -> Option<String>;
    async fn included_pets(&self, user: &User) -> Vec<PetContext>;
    async fn included_vault_entries(&self, user: &User) -> Vec<VaultEntryContext>;
    async fn recent_location(&self, user: &User) -> Option<GeoPoint>;
}

/// Stand-in for deployments with no message/pet/vault surface wired up yet,
/// or for tests that only care about the detection-and-dispatch path.
/// Respects `location_consent` even with nothing else configured.
pub struct NullContextProvider;

#[async_trait]
impl AlertContextProvider for NullContextProvider {
    async fn personal_message(&self, _user: &User) -> Option<String> {
        None
    }

    async fn included_pets(&self, _user: &User) -> Vec<PetContext> {
        Vec::new()
    }

    async fn included_vault_entries(&self, _user: &User) -> Vec<VaultEntryContext> {
        Vec::new()
    }

    async fn recent_location(&self, _user: &User) -> Option<GeoPoint> {
        None
    }
}
