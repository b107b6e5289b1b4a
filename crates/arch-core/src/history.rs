use std::collections::{BTreeSet, HashMap, HashSet};

use similar::{DiffTag, TextDiff};

use crate::config::CoalescePolicy;
use crate::node::{ArchId, NodeSnapshot, NodeType};
use crate::range::ArchRange;

/// Changed node states emitted after a notifying batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub states: Vec<NodeSnapshot>,
    pub range: ArchRange,
}

pub trait ChangeObserver {
    fn on_change(&mut self, batch: &ChangeBatch);
}

/// States to re-import to move the document to another history step.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryReplay {
    pub states: Vec<NodeSnapshot>,
    pub range: ArchRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditKind {
    Insert,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Boundary,
}

/// A single-char edit to one text node.
#[derive(Debug, Clone, Copy)]
struct TextEdit {
    id: ArchId,
    kind: EditKind,
    /// Class of the char before an insertion, or of the deleted char.
    class: Option<CharClass>,
    inserted: Option<CharClass>,
}

#[derive(Debug, Clone)]
struct Step {
    range: ArchRange,
    ids: BTreeSet<ArchId>,
    edit: Option<TextEdit>,
}

/// Step-indexed undo history. Each node keeps its own stack of
/// `(step, snapshot)` entries; step 0 is the baseline.
pub struct ArchHistory {
    root: ArchId,
    steps: Vec<Step>,
    stack_offset: usize,
    node_states: HashMap<ArchId, Vec<(usize, NodeSnapshot)>>,
    policy: CoalescePolicy,
    max_steps: usize,
}

impl ArchHistory {
    pub fn new(
        root: ArchId,
        baseline: Vec<NodeSnapshot>,
        range: ArchRange,
        policy: CoalescePolicy,
        max_steps: usize,
    ) -> Self {
        let mut node_states: HashMap<ArchId, Vec<(usize, NodeSnapshot)>> = HashMap::new();
        let mut ids = BTreeSet::new();
        for state in baseline {
            ids.insert(state.id);
            node_states.entry(state.id).or_default().push((0, state));
        }
        Self {
            root,
            steps: vec![Step {
                range,
                ids,
                edit: None,
            }],
            stack_offset: 0,
            node_states,
            policy,
            max_steps: max_steps.max(1),
        }
    }

    /// Number of recorded steps after the baseline.
    pub fn len(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stack_offset(&self) -> usize {
        self.stack_offset
    }

    pub fn record(&mut self, batch: &ChangeBatch) {
        if batch.states.is_empty() {
            return;
        }
        self.truncate_redo();

        let edit = self.classify(&batch.states);
        if let Some(edit) = edit.filter(|edit| self.coalesces_with_tail(edit)) {
            let step = self.stack_offset;
            for state in &batch.states {
                let stack = self.node_states.entry(state.id).or_default();
                match stack.last_mut() {
                    Some((last, snapshot)) if *last == step => *snapshot = state.clone(),
                    _ => stack.push((step, state.clone())),
                }
            }
            let tail = &mut self.steps[step];
            tail.range = batch.range;
            tail.edit = Some(edit);
            tracing::debug!(step, id = %edit.id, "coalesced text edit into history step");
            return;
        }

        let step = self.steps.len();
        let mut ids = BTreeSet::new();
        for state in &batch.states {
            ids.insert(state.id);
            self.node_states
                .entry(state.id)
                .or_default()
                .push((step, state.clone()));
        }
        self.steps.push(Step {
            range: batch.range,
            ids,
            edit,
        });
        self.stack_offset = step;
        tracing::debug!(step, nodes = batch.states.len(), "recorded history step");

        while self.steps.len() > self.max_steps + 1 {
            self.fold_oldest();
        }
    }

    /// Keeps the range of the current step in sync with caret moves.
    pub fn update_range(&mut self, range: ArchRange) {
        if self.stack_offset + 1 == self.steps.len() {
            self.steps[self.stack_offset].range = range;
        }
    }

    pub fn can_undo(&self) -> bool {
        (1..=self.stack_offset).any(|step| !self.diff(step - 1, step).is_empty())
    }

    pub fn can_redo(&self) -> bool {
        (self.stack_offset + 1..self.steps.len()).any(|step| !self.diff(step - 1, step).is_empty())
    }

    pub fn undo(&mut self) -> Option<HistoryReplay> {
        if !self.can_undo() {
            return None;
        }
        while self.stack_offset > 0 {
            let from = self.stack_offset;
            self.stack_offset -= 1;
            if let Some(replay) = self.replay(from, self.stack_offset) {
                tracing::debug!(step = self.stack_offset, "undo");
                return Some(replay);
            }
        }
        None
    }

    pub fn redo(&mut self) -> Option<HistoryReplay> {
        if !self.can_redo() {
            return None;
        }
        while self.stack_offset + 1 < self.steps.len() {
            let from = self.stack_offset;
            self.stack_offset += 1;
            if let Some(replay) = self.replay(from, self.stack_offset) {
                tracing::debug!(step = self.stack_offset, "redo");
                return Some(replay);
            }
        }
        None
    }

    fn replay(&self, from: usize, to: usize) -> Option<HistoryReplay> {
        let ids = self.diff(from, to);
        if ids.is_empty() {
            return None;
        }
        let active = self.active_at(to);
        let states = ids
            .into_iter()
            .filter(|id| active.contains(id))
            .filter_map(|id| self.snapshot_at(id, to).cloned())
            .collect();
        Some(HistoryReplay {
            states,
            range: self.steps[to].range,
        })
    }

    /// Ids whose state or reachability differs between two steps.
    pub fn diff(&self, from: usize, to: usize) -> BTreeSet<ArchId> {
        let (low, high) = (from.min(to), from.max(to));
        let (active_from, active_to) = (self.active_at(from), self.active_at(to));
        let mut changed: BTreeSet<ArchId> = self.steps[low + 1..=high]
            .iter()
            .flat_map(|step| step.ids.iter().copied())
            .filter(|id| self.snapshot_at(*id, from) != self.snapshot_at(*id, to))
            .collect();
        changed.extend(active_from.symmetric_difference(&active_to).copied());
        changed
    }

    fn snapshot_at(&self, id: ArchId, step: usize) -> Option<&NodeSnapshot> {
        let stack = self.node_states.get(&id)?;
        let ix = stack.partition_point(|(s, _)| *s <= step);
        ix.checked_sub(1).map(|ix| &stack[ix].1)
    }

    fn active_at(&self, step: usize) -> HashSet<ArchId> {
        let mut active = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !active.insert(id) {
                continue;
            }
            if let Some(snapshot) = self.snapshot_at(id, step) {
                stack.extend(snapshot.child_nodes.iter().copied());
            }
        }
        active
    }

    fn truncate_redo(&mut self) {
        if self.stack_offset + 1 == self.steps.len() {
            return;
        }
        let keep = self.stack_offset;
        self.steps.truncate(keep + 1);
        for stack in self.node_states.values_mut() {
            stack.retain(|(step, _)| *step <= keep);
        }
        self.node_states.retain(|_, stack| !stack.is_empty());
        // The step the new batch lands on must not coalesce into a redone edit.
        self.steps[keep].edit = None;
    }

    /// Merges step 1 into the baseline.
    fn fold_oldest(&mut self) {
        for stack in self.node_states.values_mut() {
            if stack.iter().any(|(step, _)| *step == 1) {
                stack.retain(|(step, _)| *step != 0);
            }
            for (step, _) in stack.iter_mut() {
                *step = step.saturating_sub(1);
            }
        }
        let folded = self.steps.remove(1);
        self.steps[0] = Step {
            range: folded.range,
            ids: BTreeSet::new(),
            edit: None,
        };
        self.stack_offset = self.stack_offset.saturating_sub(1);
        tracing::debug!("folded oldest history step into the baseline");
    }

    /// Detects a batch that inserts or deletes exactly one char in one text
    /// node.
    fn classify(&self, states: &[NodeSnapshot]) -> Option<TextEdit> {
        let [state] = states else {
            return None;
        };
        if state.node_type != NodeType::Text {
            return None;
        }
        let previous = self.snapshot_at(state.id, self.stack_offset)?;
        let old = previous.node_value.as_deref()?;
        let new = state.node_value.as_deref()?;

        let diff = TextDiff::from_chars(old, new);
        let mut changes = diff
            .ops()
            .iter()
            .map(|op| op.as_tag_tuple())
            .filter(|(tag, _, _)| *tag != DiffTag::Equal);
        let (tag, old_range, new_range) = changes.next()?;
        if changes.next().is_some() {
            return None;
        }

        let class = |c: char| {
            if self.policy.is_boundary(c) {
                CharClass::Boundary
            } else {
                CharClass::Word
            }
        };
        match tag {
            DiffTag::Insert if new_range.len() == 1 => {
                let chars: Vec<char> = new.chars().collect();
                let inserted = chars.get(new_range.start).copied().map(class);
                let before = new_range
                    .start
                    .checked_sub(1)
                    .and_then(|ix| chars.get(ix).copied())
                    .map(class);
                Some(TextEdit {
                    id: state.id,
                    kind: EditKind::Insert,
                    class: before,
                    inserted,
                })
            }
            DiffTag::Delete if old_range.len() == 1 => {
                let removed = old.chars().nth(old_range.start).map(class);
                Some(TextEdit {
                    id: state.id,
                    kind: EditKind::Delete,
                    class: removed,
                    inserted: None,
                })
            }
            _ => None,
        }
    }

    fn coalesces_with_tail(&self, edit: &TextEdit) -> bool {
        let tail = self.stack_offset;
        if tail == 0 || tail + 1 != self.steps.len() {
            return false;
        }
        let step = &self.steps[tail];
        if !step.ids.contains(&edit.id) {
            return false;
        }
        match (edit.kind, step.edit) {
            (EditKind::Insert, Some(prev)) if prev.kind == EditKind::Delete => false,
            (EditKind::Insert, _) => edit.class.is_some() && edit.class == edit.inserted,
            (EditKind::Delete, Some(prev)) => {
                prev.kind == EditKind::Delete && prev.id == edit.id && prev.class == edit.class
            }
            (EditKind::Delete, None) => false,
        }
    }
}

impl ChangeObserver for ArchHistory {
    fn on_change(&mut self, batch: &ChangeBatch) {
        self.record(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::range::ArchPoint;

    const ROOT: ArchId = ArchId(1);
    const TEXT: ArchId = ArchId(2);

    fn root(children: Vec<ArchId>) -> NodeSnapshot {
        NodeSnapshot {
            id: ROOT,
            node_type: NodeType::Root,
            node_name: None,
            attributes: Attributes::default(),
            node_value: None,
            child_nodes: children,
        }
    }

    fn text(value: &str) -> NodeSnapshot {
        NodeSnapshot {
            id: TEXT,
            node_type: NodeType::Text,
            node_name: None,
            attributes: Attributes::default(),
            node_value: Some(value.to_string()),
            child_nodes: Vec::new(),
        }
    }

    fn caret(offset: usize) -> ArchRange {
        ArchRange::collapsed(ArchPoint::new(TEXT, offset))
    }

    fn history(max_steps: usize) -> ArchHistory {
        ArchHistory::new(
            ROOT,
            vec![root(vec![TEXT]), text("")],
            caret(0),
            CoalescePolicy {
                boundary_chars: ".".to_string(),
            },
            max_steps,
        )
    }

    fn type_text(history: &mut ArchHistory, typed: &str) {
        let mut value = String::new();
        for c in typed.chars() {
            value.push(c);
            history.record(&ChangeBatch {
                states: vec![text(&value)],
                range: caret(value.chars().count()),
            });
        }
    }

    #[test]
    fn typing_a_word_after_a_structural_step_coalesces() {
        let mut history = history(10);
        history.record(&ChangeBatch {
            states: vec![root(vec![TEXT]), text("a")],
            range: caret(1),
        });
        history.record(&ChangeBatch {
            states: vec![text("ab")],
            range: caret(2),
        });
        history.record(&ChangeBatch {
            states: vec![text("abc")],
            range: caret(3),
        });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn word_boundaries_open_new_steps() {
        let mut history = history(10);
        type_text(&mut history, "a b");
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn undo_returns_previous_states_and_range() {
        let mut history = history(10);
        type_text(&mut history, "a b");
        let replay = history.undo().unwrap();
        assert_eq!(replay.states, vec![text("a ")]);
        assert_eq!(replay.range, caret(2));
        assert!(history.can_redo());
        let replay = history.redo().unwrap();
        assert_eq!(replay.states, vec![text("a b")]);
    }

    #[test]
    fn recording_after_undo_drops_the_redo_tail() {
        let mut history = history(10);
        type_text(&mut history, "a b");
        history.undo().unwrap();
        history.record(&ChangeBatch {
            states: vec![text("a c")],
            range: caret(3),
        });
        assert!(!history.can_redo());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn oldest_steps_fold_into_the_baseline() {
        let mut history = history(2);
        type_text(&mut history, "a b.");
        assert_eq!(history.len(), 2);
        while history.undo().is_some() {}
        assert_eq!(history.stack_offset(), 0);
        assert_eq!(history.snapshot_at(TEXT, 0), Some(&text("a ")));
    }

    #[test]
    fn empty_diffs_are_skipped_when_undoing() {
        let mut history = history(10);
        type_text(&mut history, "a ");
        history.record(&ChangeBatch {
            states: vec![text("a ")],
            range: caret(2),
        });
        let replay = history.undo().unwrap();
        assert_eq!(replay.states, vec![text("a")]);
    }
}
