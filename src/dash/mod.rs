mod manifest;
mod template;

pub use manifest::{Representation, parse};
