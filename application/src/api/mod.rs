//! GraphQL API definitions.

mod mutation;
mod query;
pub mod scalar;
mod subscription;
pub mod user;

pub use self::{
    mutation::Mutation, query::Query, subscription::Subscription, user::User,
};

/// GraphQL schema.
pub type Schema = juniper::RootNode<'static, Query, Mutation, Subscription>;
