//! Spoken sub-dialogues: the shared turn loop and its termination rules.

pub mod engine;
pub mod terminator;

pub use engine::{
    DialogueEnd, DialogueObserver, DialogueState, DialogueUpdate, HistorySink, PersonaReplies, ReplySource,
    TurnEngine,
};
pub use terminator::{
    ClassifierEnd, DialogueKind, DialogueTerminator, EndCondition, EndDecision, EndReason, HeuristicEnd,
};
