//! The interpreter's data stacks and conditional-execution stack.

use crate::script::data::ScriptData;
use crate::script::error::ScriptError;

/// A simple LIFO stack of [`ScriptData`], shared shape for both the main
/// stack and the alt stack.
#[derive(Debug, Clone, Default)]
pub struct Stack(Vec<ScriptData>);

impl Stack {
    pub fn new() -> Self {
        Stack(Vec::new())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, item: ScriptData) {
        self.0.push(item);
    }

    pub fn pop(&mut self) -> Result<ScriptData, ScriptError> {
        self.0.pop().ok_or(ScriptError::InvalidStackOperation)
    }

    /// Peeks the item `idx` from the top (0 = top).
    pub fn top(&self, idx: usize) -> Result<&ScriptData, ScriptError> {
        let len = self.0.len();
        if idx >= len {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(&self.0[len - 1 - idx])
    }

    pub fn top_mut(&mut self, idx: usize) -> Result<&mut ScriptData, ScriptError> {
        let len = self.0.len();
        if idx >= len {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(&mut self.0[len - 1 - idx])
    }

    /// Erases the item `idx` from the top (0 = top).
    pub fn erase(&mut self, idx: usize) -> Result<ScriptData, ScriptError> {
        let len = self.0.len();
        if idx >= len {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(self.0.remove(len - 1 - idx))
    }

    /// Inserts `item` so it becomes position `idx` from the top (0 = top).
    pub fn insert(&mut self, idx: usize, item: ScriptData) -> Result<(), ScriptError> {
        let len = self.0.len();
        if idx > len {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.0.insert(len - idx, item);
        Ok(())
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), ScriptError> {
        let len = self.0.len();
        if a >= len || b >= len {
            return Err(ScriptError::InvalidStackOperation);
        }
        self.0.swap(len - 1 - a, len - 1 - b);
        Ok(())
    }

    pub fn as_slice(&self) -> &[ScriptData] {
        &self.0
    }
}

/// Tracks nested `IF`/`NOTIF`/`ELSE`/`ENDIF` execution state. Mirrors the
/// upstream `ConditionStack`: each entry is executed-bit + "has an else
/// already been seen" bit, packed as one byte per level so depth is cheap
/// to query without a second vector.
#[derive(Debug, Clone, Default)]
pub struct ConditionStack {
    stack: Vec<u8>,
    first_false_pos: Option<usize>,
}

const EXEC_BIT: u8 = 1;

impl ConditionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn all_true(&self) -> bool {
        self.first_false_pos.is_none()
    }

    pub fn push_back(&mut self, exec: bool) {
        if self.first_false_pos.is_none() && !exec {
            self.first_false_pos = Some(self.stack.len());
        }
        self.stack.push(if exec { EXEC_BIT } else { 0 });
    }

    pub fn pop_back(&mut self) -> Result<(), ScriptError> {
        if self.stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        if self.first_false_pos == Some(self.stack.len() - 1) {
            self.first_false_pos = None;
        }
        self.stack.pop();
        Ok(())
    }

    /// Flips the top frame's executed bit (used by `OP_ELSE`).
    pub fn toggle_top(&mut self) -> Result<(), ScriptError> {
        if self.stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        let len = self.stack.len();
        if self.first_false_pos.is_none() {
            let was_exec = self.stack[len - 1] == EXEC_BIT;
            self.stack[len - 1] = if was_exec { 0 } else { EXEC_BIT };
            if self.stack[len - 1] == 0 {
                self.first_false_pos = Some(len - 1);
            }
        } else if self.first_false_pos == Some(len - 1) {
            self.stack[len - 1] = EXEC_BIT;
            self.first_false_pos = None;
            // recompute in case an earlier false still exists (there shouldn't be one deeper)
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_if_tracks_all_true() {
        let mut cs = ConditionStack::new();
        cs.push_back(true);
        assert!(cs.all_true());
        cs.push_back(false);
        assert!(!cs.all_true());
        cs.toggle_top().unwrap();
        assert!(cs.all_true());
        cs.pop_back().unwrap();
        cs.pop_back().unwrap();
        assert!(cs.empty());
    }

    #[test]
    fn stack_top_and_erase() {
        let mut s = Stack::new();
        s.push(ScriptData::new(vec![1]));
        s.push(ScriptData::new(vec![2]));
        assert_eq!(s.top(0).unwrap().0, vec![2]);
        s.erase(1).unwrap();
        assert_eq!(s.depth(), 1);
        assert_eq!(s.top(0).unwrap().0, vec![2]);
    }
}
