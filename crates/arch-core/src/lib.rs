mod attributes;
mod commands;
mod config;
mod core;
mod error;
mod history;
mod list;
mod markup;
mod mutation;
mod node;
mod range;
mod registry;
mod rules;
mod tree;
mod value;

pub use crate::attributes::*;
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::history::*;
pub use crate::list::*;
pub use crate::markup::*;
pub use crate::mutation::*;
pub use crate::node::*;
pub use crate::range::*;
pub use crate::registry::*;
pub use crate::rules::*;
pub use crate::tree::*;
pub use crate::value::*;
