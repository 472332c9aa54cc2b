//! Who is playing: backend user lookup and the local last-user file

mod directory;
mod store;

pub use directory::{resolve_user_id, RestUserDirectory, StaticUserDirectory, UserDirectory};
pub use store::{LocalStore, StoredState};
