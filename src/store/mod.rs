/// Persistence module
///
/// Account and refresh-token storage behind async traits, each with a
/// PostgreSQL and an in-memory implementation.

mod account;
mod session;

pub use account::{Account, AccountStore, InMemoryAccountStore, NewAccount, PgAccountStore, DEFAULT_ROLE};
pub use session::{
    hash_token, spawn_sweeper, InMemorySessionStore, NewRefreshToken, PgSessionStore,
    RefreshTokenRecord, RevokeOutcome, SessionStore,
};
