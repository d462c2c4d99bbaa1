//! Aliyun ECS inventory access.
//!
//! [`EcsClient`] wraps the paginated `DescribeInstances` listing call,
//! applying the user-configured filters plus the hardcoded defaults
//! (running, VPC-networked instances). Requests are signed per the Aliyun
//! RPC signature scheme.

pub mod client;
pub mod model;
mod sign;

pub use client::{EcsClient, Error, PAGE_SIZE, Result, split_tag};
pub use model::Instance;
