//! GitHub API access: client, pagination, error taxonomy, wire types.

pub mod client;
pub mod error;
pub mod graphql;
pub mod pagination;
pub mod types;

pub use client::{API_ROOT, GithubClient};
pub use error::{GithubError, classify_response};
pub use pagination::{FetchOutcome, PartialFailure, ResultSet, parse_next_link};
