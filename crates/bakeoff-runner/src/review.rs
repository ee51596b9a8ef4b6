//! Manual review of traces as a plain state machine.
//!
//! [`step`] is pure: it takes the current position and draft plus a command
//! and returns the next state and, for `Save`, the record to persist. A UI
//! (the terminal loop in the CLI, or anything else) renders the state and
//! feeds commands; [`ReviewSession`] wires the effects to a [`LabelStore`].

use anyhow::Result;
use bakeoff_analysis::Trace;

use crate::labels::{label_timestamp, LabelRecord, LabelStore, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Reasoning,
    Math,
    Citation,
    Question,
}

/// Editable fields for the trace under review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub reasoning_bad: bool,
    pub math_bad: bool,
    pub citation_bad: bool,
    pub question_bad: bool,
    pub verdict: Verdict,
    pub comment: String,
}

impl Draft {
    fn hydrate(label: Option<&LabelRecord>) -> Self {
        match label {
            Some(rec) => Self {
                reasoning_bad: rec.reasoning_bad,
                math_bad: rec.math_bad,
                citation_bad: rec.citation_bad,
                question_bad: rec.question_bad,
                verdict: rec.verdict,
                comment: rec.comment.clone(),
            },
            None => Self::default(),
        }
    }

    fn toggle(&mut self, flag: Flag) {
        let slot = match flag {
            Flag::Reasoning => &mut self.reasoning_bad,
            Flag::Math => &mut self.math_bad,
            Flag::Citation => &mut self.citation_bad,
            Flag::Question => &mut self.question_bad,
        };
        *slot = !*slot;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewState {
    pub index: usize,
    pub draft: Draft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Save,
    Toggle(Flag),
    SetVerdict(Verdict),
    SetComment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Persist(LabelRecord),
}

/// Position 0 with its stored label, or `None` when there is nothing to review.
pub fn initial_state(traces: &[Trace], labels: &LabelStore) -> Option<ReviewState> {
    let first = traces.first()?;
    Some(ReviewState {
        index: 0,
        draft: Draft::hydrate(labels.get(&first.model, &first.turn)),
    })
}

fn move_to(index: usize, traces: &[Trace], labels: &LabelStore) -> ReviewState {
    let t = &traces[index];
    ReviewState {
        index,
        draft: Draft::hydrate(labels.get(&t.model, &t.turn)),
    }
}

/// Applies `command`. Navigation clamps at both ends and discards unsaved
/// draft edits, reloading the stored label for the new position.
pub fn step(
    state: &ReviewState,
    command: Command,
    traces: &[Trace],
    labels: &LabelStore,
    timestamp: &str,
) -> (ReviewState, Option<Effect>) {
    match command {
        Command::Next if state.index + 1 < traces.len() => {
            (move_to(state.index + 1, traces, labels), None)
        }
        Command::Prev if state.index > 0 && state.index <= traces.len() => {
            (move_to(state.index - 1, traces, labels), None)
        }
        Command::Next | Command::Prev => (state.clone(), None),
        Command::Save => {
            let Some(t) = traces.get(state.index) else {
                return (state.clone(), None);
            };
            let d = &state.draft;
            let record = LabelRecord {
                timestamp: timestamp.to_string(),
                model: t.model.clone(),
                turn: t.turn.clone(),
                response_path: t.response_path.display().to_string(),
                reasoning_bad: d.reasoning_bad,
                math_bad: d.math_bad,
                citation_bad: d.citation_bad,
                question_bad: d.question_bad,
                verdict: d.verdict,
                comment: d.comment.clone(),
            };
            (state.clone(), Some(Effect::Persist(record)))
        }
        Command::Toggle(flag) => {
            let mut next = state.clone();
            next.draft.toggle(flag);
            (next, None)
        }
        Command::SetVerdict(verdict) => {
            let mut next = state.clone();
            next.draft.verdict = verdict;
            (next, None)
        }
        Command::SetComment(comment) => {
            let mut next = state.clone();
            next.draft.comment = comment;
            (next, None)
        }
    }
}

/// Traces under review, their label store and the current state.
pub struct ReviewSession {
    traces: Vec<Trace>,
    store: LabelStore,
    state: Option<ReviewState>,
}

impl ReviewSession {
    pub fn new(mut traces: Vec<Trace>, store: LabelStore) -> Self {
        traces.sort_by(|a, b| (&a.model, &a.turn).cmp(&(&b.model, &b.turn)));
        let state = initial_state(&traces, &store);
        Self {
            traces,
            store,
            state,
        }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn current(&self) -> Option<(&Trace, &ReviewState)> {
        let state = self.state.as_ref()?;
        Some((self.traces.get(state.index)?, state))
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    /// Returns true when the command persisted a label.
    pub fn apply(&mut self, command: Command) -> Result<bool> {
        let Some(state) = self.state.as_ref() else {
            return Ok(false);
        };
        let (next, effect) = step(state, command, &self.traces, &self.store, &label_timestamp());
        self.state = Some(next);
        match effect {
            Some(Effect::Persist(record)) => {
                self.store.upsert_and_save(record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
