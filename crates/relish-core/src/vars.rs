//! Layered variable scope and `{NAME}` substitution.
//!
//! The scope is a stack of frames. Lookups search innermost-to-outermost;
//! a pushed frame inherits visibility of everything below it and takes all
//! of its own definitions with it when popped, including on failure paths.

use std::collections::HashMap;

use crate::errors::{EngineError, Result};
use crate::model::StepArg;

#[derive(Debug, Clone)]
pub struct VariableScope {
    frames: Vec<HashMap<String, String>>,
}

impl Default for VariableScope {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableScope {
    /// A scope with a single outermost frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    /// Define `name` in the innermost frame, shadowing outer definitions.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        // Invariant: frames is never empty.
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value.into());
        }
    }

    /// Innermost-to-outermost lookup.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.get(name).map(String::as_str))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Open a child frame. Callers on async paths pair this with
    /// [`pop`](Self::pop) on every exit, including failure; sync callers
    /// should prefer [`with_frame`](Self::with_frame).
    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Discard the innermost frame and everything it defined. The outermost
    /// frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Run `f` inside a child frame. The frame is popped when `f` returns,
    /// whether it succeeded or not, so inner definitions never leak.
    pub fn with_frame<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push();
        let out = f(self);
        self.pop();
        out
    }
}

/// Replace every well-formed `{NAME}` token in `text` with the value of
/// `NAME` in `scope`.
///
/// `\{` and `\}` emit literal braces without triggering a lookup. The scan
/// is single-pass and left-to-right; substituted values are not re-scanned,
/// so substitution cannot loop. A brace that never closes is emitted as-is.
pub fn substitute(text: &str, scope: &VariableScope) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some((_, '{')) | Some((_, '}')) => {
                    // Escaped brace: emit literally, consume the brace.
                    let (_, b) = chars.next().unwrap_or((0, c));
                    out.push(b);
                }
                _ => out.push('\\'),
            },
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if closed && !name.is_empty() && !name.contains('{') {
                    match scope.lookup(&name) {
                        Some(value) => out.push_str(value),
                        None => {
                            return Err(EngineError::UndefinedVariable {
                                name,
                                text: text.to_string(),
                            })
                        }
                    }
                } else {
                    // Not a token: emit what was consumed verbatim.
                    out.push('{');
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Substitute every cell of a step argument.
pub fn substitute_arg(arg: &StepArg, scope: &VariableScope) -> Result<StepArg> {
    match arg {
        StepArg::None => Ok(StepArg::None),
        StepArg::DocString(s) => Ok(StepArg::DocString(substitute(s, scope)?)),
        StepArg::Table(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let mut cells = Vec::with_capacity(row.len());
                for cell in row {
                    cells.push(substitute(cell, scope)?);
                }
                out.push(cells);
            }
            Ok(StepArg::Table(out))
        }
    }
}
