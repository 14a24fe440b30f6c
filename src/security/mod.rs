//! Security checks applied to plugin-supplied names.

pub mod path;

pub use path::{join_in_dir, validate_bare_filename, validate_binary_name, SafePath};
