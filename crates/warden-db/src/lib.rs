//! Warden DB - Database abstractions
//!
//! SQLx-based persistence for the Warden auth core. The auth core only
//! depends on the traits in [`repo`]; [`pg`] holds the Postgres
//! implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_db::{create_pool, Repositories, UserRepository};
//!
//! let pool = create_pool("postgres://localhost/iam_db").await?;
//! let repos = Repositories::new(pool);
//!
//! let user = repos.users.find_by_username("admin").await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, DbPool, PoolOptions};
pub use repo::*;
