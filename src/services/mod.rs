/// Text views fed by timers, scoreboards and the outcome popup.
pub mod display;
/// Room settings, match start and roster.
pub mod lobby_service;
/// Match driver running the phases.
pub mod match_service;
/// Match notification payloads published on the hub.
pub mod notifications;
/// Reactions to room join, leave and property notifications.
pub mod room_events;
/// Score events and scoreboard refresh.
pub mod scoring_service;
/// Join-order team assignment and team lookup.
pub mod team_assignment;
