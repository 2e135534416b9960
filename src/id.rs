use uuid::Uuid;

/// Generate a time-ordered identifier for a new entity.
///
/// Ids are opaque strings: assigned once at creation, never reused, and
/// compared only for equality.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}
