/// Process-local room implementation.
pub mod memory;
/// Room platform abstraction and replicated property keys.
pub mod room;
