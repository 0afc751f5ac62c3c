mod coordinator;
mod credentials;
mod store;

pub use coordinator::RefreshCoordinator;
pub use credentials::CredentialPair;
pub use store::CredentialStore;
