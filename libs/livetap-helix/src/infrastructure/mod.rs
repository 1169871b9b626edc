mod helix_source;

pub use helix_source::{HelixConfig, HelixStreamSource};
