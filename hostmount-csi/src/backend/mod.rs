//! Concrete plugin implementations.
//!
//! Each backend module provides a type that implements [`CsiIdentity`] and
//! [`CsiNode`].
//!
//! [`CsiIdentity`]: crate::identity::CsiIdentity
//! [`CsiNode`]: crate::node::CsiNode

pub mod hostmount;
