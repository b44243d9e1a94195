//! Dependency resolver for required methods.
//!
//! Design:
//! - Depth-first over the "requires" edges of one target type.
//! - Post-order emit: a prerequisite's own prerequisites come before it.
//! - First visit wins, so the result has no duplicates and is deterministic.
//! - Gray/black marks detect cycles; the root starts gray, so a method that
//!   transitively requires itself is reported as a cycle.

use std::collections::HashMap;

use crate::domain::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    Gray,
    /// Fully explored and already emitted.
    Black,
}

struct Walk<'t> {
    target_type: &'t str,
    marks: HashMap<String, Mark>,
    path: Vec<String>,
    order: Vec<String>,
}

impl Walk<'_> {
    fn visit<'a, F>(&mut self, method: &str, requires: &F) -> Result<(), TaskError>
    where
        F: Fn(&str) -> Option<&'a [String]>,
    {
        match self.marks.get(method) {
            Some(Mark::Black) => return Ok(()),
            Some(Mark::Gray) => {
                let start = self.path.iter().position(|m| m == method).unwrap_or(0);
                let mut chain = self.path[start..].to_vec();
                chain.push(method.to_string());
                return Err(TaskError::CycleDetected { chain });
            }
            None => {}
        }

        let required = requires(method).ok_or_else(|| TaskError::NotRegistered {
            method: method.to_string(),
            target_type: self.target_type.to_string(),
        })?;

        self.marks.insert(method.to_string(), Mark::Gray);
        self.path.push(method.to_string());
        for prerequisite in required {
            self.visit(prerequisite, requires)?;
        }
        self.path.pop();
        self.marks.insert(method.to_string(), Mark::Black);
        self.order.push(method.to_string());
        Ok(())
    }
}

/// Transitive required methods of `method`, prerequisites first, `method`
/// itself excluded.
///
/// `requires` returns the declared prerequisites of a method, or `None` if the
/// method is not registered for `target_type`.
pub fn resolve<'a, F>(
    target_type: &str,
    method: &str,
    requires: F,
) -> Result<Vec<String>, TaskError>
where
    F: Fn(&str) -> Option<&'a [String]>,
{
    let mut walk = Walk {
        target_type,
        marks: HashMap::new(),
        path: Vec::new(),
        order: Vec::new(),
    };
    walk.visit(method, &requires)?;
    // Post-order puts the root last.
    walk.order.pop();
    Ok(walk.order)
}
