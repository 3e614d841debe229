pub mod identity_store;
pub mod login_history;

pub use identity_store::{FileIdentityStore, IdentityRecord, IdentityStore, MemoryIdentityStore, NewIdentity};
pub use login_history::{FileLoginRecorder, LoginAttempt, LoginRecorder, MemoryLoginRecorder};
