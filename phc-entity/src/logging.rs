//! Log formatting helpers

use serde::Serialize;
use std::fmt::Debug;

/// Wrapper for pretty-printing payloads in logs as YAML
///
/// ```ignore
/// use phc_entity::Pretty;
/// use tracing::debug;
///
/// debug!("custom fields: {}", Pretty(&fields));
/// ```
///
/// Outputs YAML with a leading newline. Debug is used as a fallback if YAML
/// serialization fails.
pub struct Pretty<T>(pub T);

impl<T: Serialize + Debug> std::fmt::Display for Pretty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_yaml_ng::to_string(&self.0) {
            Ok(yaml) => write!(f, "\n{}", yaml),
            Err(_) => write!(f, "\n{:#?}", self.0),
        }
    }
}
