use std::fmt;

use quake_config::DOMAIN;

use crate::Coordinator;

/// Entity family of the point-marker entities.
pub const GEO_LOCATION_DOMAIN: &str = "geo_location";
/// Entity family of the diagnostic status entity.
pub const SENSOR_DOMAIN: &str = "sensor";

/// Object-id prefix of every point-marker entity.
const OBJECT_ID_PREFIX: &str = "ingv";

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Payload of the creation notification.
#[derive(Clone, Debug)]
pub struct NewEntity {
    pub coordinator: Coordinator,
    /// Unique id of the config entry that owns the coordinator.
    pub scope: String,
    pub event_id: String,
}

/// Notifications emitted by a coordinator.
#[derive(Clone, Debug)]
pub enum Signal {
    NewEntity(NewEntity),
    Delete { event_id: String },
    DataChanged,
}

pub fn new_entity_signal(entry_id: &str) -> String {
    format!("{DOMAIN}_new_geolocation_{entry_id}")
}

/// Deletions are scoped to the owning entry as well as the event, so two
/// locations that both see one quake never delete each other's entity.
pub fn delete_signal(entry_id: &str, event_id: &str) -> String {
    format!("{DOMAIN}_delete_{entry_id}_{event_id}")
}

pub fn data_changed_signal(entry_id: &str) -> String {
    format!("{DOMAIN}_data_changed_{entry_id}")
}

// ---------------------------------------------------------------------------
// Identifier formats
// ---------------------------------------------------------------------------

pub fn geo_unique_id(scope: &str, event_id: &str) -> String {
    format!("{scope}_{event_id}")
}

pub fn status_unique_id(scope: &str) -> String {
    format!("{scope}_status")
}

/// Object id suggested to the registry for a point-marker entity.
pub fn canonical_object_id(scope: &str, event_id: &str) -> String {
    format!(
        "{OBJECT_ID_PREFIX}_{}_{}",
        slugify(scope),
        slugify(event_id)
    )
}

pub fn canonical_entity_id(scope: &str, event_id: &str) -> String {
    format!(
        "{GEO_LOCATION_DOMAIN}.{}",
        canonical_object_id(scope, event_id)
    )
}

/// `true` when `entity_id` is `canonical` with a `_<digits>` collision suffix.
pub fn has_collision_suffix(entity_id: &str, canonical: &str) -> bool {
    entity_id
        .strip_prefix(canonical)
        .and_then(|rest| rest.strip_prefix('_'))
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Lowercase ASCII slug: runs of anything but `[a-z0-9]` become one `_`.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for c in s.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("unknown");
    }
    out
}

// ---------------------------------------------------------------------------
// Registry records
// ---------------------------------------------------------------------------

/// A host registry record. Owned by the host; the coordinator only reads it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegistryEntry {
    /// Displayed id, `<domain>.<object_id>`.
    pub entity_id: String,
    /// Platform-scoped unique id.
    pub unique_id: String,
    /// Integration that created the record.
    pub platform: String,
    pub config_entry_id: Option<String>,
}

impl RegistryEntry {
    /// Entity family, the part of the entity id before the dot.
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(d, _)| d)
            .unwrap_or("")
    }

    pub fn belongs_to(&self, config_entry_id: &str) -> bool {
        self.config_entry_id.as_deref() == Some(config_entry_id)
    }
}

/// Registration request for [`crate::EntityRegistry::get_or_create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub domain: String,
    pub platform: String,
    pub unique_id: String,
    pub suggested_object_id: String,
    pub config_entry_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Rename target already exists.
    EntityIdTaken { entity_id: String },
    NotFound { entity_id: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EntityIdTaken { entity_id } => {
                write!(f, "entity id already registered: {entity_id}")
            }
            RegistryError::NotFound { entity_id } => {
                write!(f, "entity id not registered: {entity_id}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}
