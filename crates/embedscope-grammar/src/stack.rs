//! Lexical state carried from one line to the next

use crate::rule::RuleId;

/// The rules active at the end of a line.
///
/// Produced by [`Grammar::tokenize_line`](crate::Grammar::tokenize_line) and
/// fed back in for the following line. [`RuleStack::initial`] is the state
/// before the first line of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStack {
    frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StackFrame {
    pub(crate) rule: RuleId,
    /// Byte position the rule was pushed at, on the current line only
    pub(crate) enter_pos: Option<usize>,
    /// `\G` position inherited when the rule was pushed
    pub(crate) anchor_pos: Option<usize>,
    /// Whether the begin match ran up to the end of its line
    pub(crate) begin_captured_eol: bool,
    /// `end`/`while` pattern with back-references already substituted
    pub(crate) end_rule: Option<String>,
    /// Scopes including the rule's `name`
    pub(crate) name_scopes: Vec<String>,
    /// Scopes including the rule's `contentName`
    pub(crate) content_scopes: Vec<String>,
}

impl StackFrame {
    pub(crate) fn root(rule: RuleId, scope_name: &str) -> Self {
        let scopes = vec![scope_name.to_string()];
        Self {
            rule,
            enter_pos: None,
            anchor_pos: None,
            begin_captured_eol: false,
            end_rule: None,
            name_scopes: scopes.clone(),
            content_scopes: scopes,
        }
    }
}

impl RuleStack {
    /// State before the first line of a document
    pub fn initial() -> Self {
        Self::default()
    }

    /// Whether no line has been tokenized yet
    pub fn is_initial(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of active rules, the grammar root included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Scopes applying to text after the end of the line
    pub fn scopes(&self) -> &[String] {
        self.frames.last().map_or(&[], |f| f.content_scopes.as_slice())
    }

    pub(crate) fn from_frames(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    /// Frames ready for a new line: per-line positions are cleared
    pub(crate) fn frames_for_next_line(&self) -> Vec<StackFrame> {
        let mut frames = self.frames.clone();
        for frame in &mut frames {
            frame.enter_pos = None;
            frame.anchor_pos = None;
        }
        frames
    }
}

/// Working stack used while tokenizing one line. Never pops the root frame.
#[derive(Debug, Clone)]
pub(crate) struct Frames {
    frames: Vec<StackFrame>,
}

impl Frames {
    pub(crate) fn new(frames: Vec<StackFrame>) -> Self {
        debug_assert!(!frames.is_empty());
        Self { frames }
    }

    pub(crate) fn top(&self) -> &StackFrame {
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn top_mut(&mut self) -> &mut StackFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn get(&self, depth: usize) -> &StackFrame {
        &self.frames[depth]
    }

    pub(crate) fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Pop the top frame; the root frame is kept
    pub(crate) fn pop(&mut self) -> Option<StackFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Drop every frame above `depth`
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// Whether the top frame re-enters a rule already entered at the same
    /// position by one of the frames below it
    pub(crate) fn top_repeats_enclosing(&self) -> bool {
        let Some((top, below)) = self.frames.split_last() else {
            return false;
        };
        below
            .iter()
            .rev()
            .take_while(|f| f.enter_pos == top.enter_pos)
            .any(|f| f.rule == top.rule)
    }

    pub(crate) fn into_stack(self) -> RuleStack {
        RuleStack::from_frames(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rule: usize, enter_pos: Option<usize>) -> StackFrame {
        StackFrame {
            rule: RuleId::new(rule),
            enter_pos,
            ..StackFrame::root(RuleId::new(rule), "source.test")
        }
    }

    #[test]
    fn test_initial_stack() {
        let stack = RuleStack::initial();
        assert!(stack.is_initial());
        assert_eq!(stack.depth(), 0);
        assert!(stack.scopes().is_empty());
    }

    #[test]
    fn test_root_is_never_popped() {
        let mut frames = Frames::new(vec![frame(0, None)]);
        assert!(frames.pop().is_none());
        frames.push(frame(1, Some(0)));
        assert!(frames.pop().is_some());
        assert_eq!(frames.len(), 1);

        frames.truncate(0);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_next_line_clears_positions() {
        let mut top = frame(1, Some(4));
        top.anchor_pos = Some(4);
        let stack = RuleStack::from_frames(vec![frame(0, None), top]);

        let next = stack.frames_for_next_line();
        assert!(next.iter().all(|f| f.enter_pos.is_none() && f.anchor_pos.is_none()));
        assert_eq!(next[1].rule, RuleId::new(1));
    }

    #[test]
    fn test_repeated_rule_detection() {
        let mut frames = Frames::new(vec![frame(0, None), frame(3, Some(2))]);
        frames.push(frame(4, Some(2)));
        frames.push(frame(3, Some(2)));
        assert!(frames.top_repeats_enclosing());

        frames.top_mut().enter_pos = Some(5);
        assert!(!frames.top_repeats_enclosing());
    }
}
