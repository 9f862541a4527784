//! Fragment Store
//!
//! Ordered, addressable SQL fragments keyed by step id. The rendered script
//! frames each body with sentinel comment lines so a fragment can be located
//! and replaced without parsing SQL:
//!
//! ```text
//! -- BEGIN STEP: 0
//! INSERT INTO omop.location ...;
//! -- END STEP: 0
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const BEGIN_MARKER: &str = "-- BEGIN STEP:";
pub const END_MARKER: &str = "-- END STEP:";

/// One addressable unit of generated SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub step_id: String,
    pub body: String,
}

/// Ordered fragment collection. Mutations are whole-fragment only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentStore {
    fragments: Vec<Fragment>,
}

fn is_marker_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with(BEGIN_MARKER) || line.starts_with(END_MARKER)
}

fn check_step_id(step_id: &str) -> Result<(), StoreError> {
    if step_id.trim().is_empty() || step_id.trim() != step_id || step_id.contains('\n') {
        return Err(StoreError::CorruptStore {
            reason: format!("invalid step id {:?}", step_id),
        });
    }
    Ok(())
}

fn check_body(step_id: &str, body: &str) -> Result<(), StoreError> {
    if body.lines().any(is_marker_line) {
        return Err(StoreError::CorruptStore {
            reason: format!("body for step '{}' contains a step marker line", step_id),
        });
    }
    Ok(())
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment at the end
    pub fn append(&mut self, step_id: &str, body: &str) -> Result<(), StoreError> {
        check_step_id(step_id)?;
        if self.contains(step_id) {
            return Err(StoreError::DuplicateStepId {
                step_id: step_id.to_string(),
            });
        }
        check_body(step_id, body)?;
        self.fragments.push(Fragment {
            step_id: step_id.to_string(),
            body: body.trim().to_string(),
        });
        Ok(())
    }

    /// Replace the full body of an existing fragment, keeping its position
    pub fn replace(&mut self, step_id: &str, body: &str) -> Result<(), StoreError> {
        check_body(step_id, body)?;
        let fragment = self
            .fragments
            .iter_mut()
            .find(|f| f.step_id == step_id)
            .ok_or_else(|| StoreError::StepNotFound {
                step_id: step_id.to_string(),
            })?;
        fragment.body = body.trim().to_string();
        Ok(())
    }

    pub fn get(&self, step_id: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.step_id == step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.get(step_id).is_some()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.step_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenate all bodies in store order, each framed by its markers
    pub fn render(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            out.push_str(&format!("{} {}\n", BEGIN_MARKER, fragment.step_id));
            out.push_str(&fragment.body);
            out.push('\n');
            out.push_str(&format!("{} {}\n\n", END_MARKER, fragment.step_id));
        }
        out
    }

    /// Rebuild a store from a rendered script.
    ///
    /// Unmatched, nested, mismatched or duplicate markers, and non-blank text
    /// outside any step, are reported as `CorruptStore`. Lines split on `\n`
    /// only; a `\r` inside a body is kept as written.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let mut store = Self::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut open: Option<(String, Vec<&str>)> = None;

        for (index, line) in text.split('\n').enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();

            if let Some(rest) = trimmed.strip_prefix(BEGIN_MARKER) {
                let step_id = rest.trim();
                if let Some((current, _)) = &open {
                    return Err(StoreError::CorruptStore {
                        reason: format!(
                            "line {}: BEGIN for step '{}' inside open step '{}'",
                            line_no, step_id, current
                        ),
                    });
                }
                if step_id.is_empty() {
                    return Err(StoreError::CorruptStore {
                        reason: format!("line {}: BEGIN marker without step id", line_no),
                    });
                }
                if !seen.insert(step_id.to_string()) {
                    return Err(StoreError::CorruptStore {
                        reason: format!("line {}: duplicate step '{}'", line_no, step_id),
                    });
                }
                open = Some((step_id.to_string(), Vec::new()));
            } else if let Some(rest) = trimmed.strip_prefix(END_MARKER) {
                let step_id = rest.trim();
                match open.take() {
                    Some((current, lines)) if current == step_id => {
                        store.fragments.push(Fragment {
                            step_id: current,
                            body: lines.join("\n").trim().to_string(),
                        });
                    }
                    Some((current, _)) => {
                        return Err(StoreError::CorruptStore {
                            reason: format!(
                                "line {}: END for step '{}' while step '{}' is open",
                                line_no, step_id, current
                            ),
                        });
                    }
                    None => {
                        return Err(StoreError::CorruptStore {
                            reason: format!(
                                "line {}: END for step '{}' without BEGIN",
                                line_no, step_id
                            ),
                        });
                    }
                }
            } else if let Some((_, lines)) = open.as_mut() {
                lines.push(line);
            } else if !trimmed.is_empty() {
                return Err(StoreError::CorruptStore {
                    reason: format!("line {}: text outside any step", line_no),
                });
            }
        }

        if let Some((current, _)) = open {
            return Err(StoreError::CorruptStore {
                reason: format!("step '{}' has no END marker", current),
            });
        }
        Ok(store)
    }

    /// Write the rendered script to `path`
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::write(path, self.render()).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load and parse a rendered script
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&text)
    }
}
