/// Notification payloads broadcast on the match hub.
pub mod notifications;
/// Serialisable score snapshots.
pub mod snapshot;
