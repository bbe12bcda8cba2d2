//! Client side of the todo list: remote API access, the optimistic list cache
//! and the filters the presentation layer renders through.

pub mod cache;
pub mod filter;
pub mod reconciler;
pub mod remote;
