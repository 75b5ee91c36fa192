//! The step/fork driver: every bytecode is an [`Algorithm`] with a single
//! `exec` entry, grouped into the four schemas from §4.4.
//!
//! `~200` opcodes all reduce to instances of these schemas; this catalog
//! implements a representative slice of each rather than a decoder per
//! opcode (the general decoder is out of scope — see `spec.md` §1's
//! explicit non-goal).

pub mod access;
pub mod branch;
pub mod fork;
pub mod local;

use crate::decision::DecisionProcedure;
use crate::error::Result;
use crate::lics::LicsRules;
use crate::state::State;

/// The `heapScope` limit the runner enforces: a reference-resolution fork
/// may not propose `EXPANDS(class)` alternatives that would push the
/// post-state population of `class` past this many instances.
#[derive(Debug, Clone, Copy)]
pub struct HeapScope {
    pub per_class_limit: usize,
}

/// Per-step context an [`Algorithm`] needs beyond the state itself: the
/// decision procedure to query and the LICS rules that prune its
/// alternatives before any query is made.
pub struct StepContext<'a> {
    pub decision_procedure: &'a mut dyn DecisionProcedure,
    pub lics_rules: &'a LicsRules,
    pub heap_scope: Option<HeapScope>,
}

/// A single bytecode's behavior. `exec` is total: failures are reported by
/// throwing a modeled exception into `state` (recoverable), by setting
/// `stuck`, or by returning an `Err` that the engine treats as fatal or
/// engine-recoverable per §7.
///
/// Returns the fork's successors. An empty vec means `state` was mutated
/// in place (schemas (a)/(b)/(c), or the non-forking case of (d)); a
/// non-empty vec means `state` is stale and the engine must adopt the
/// first successor as current, queuing the rest.
pub trait Algorithm {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>>;
}

/// JVM-style opcode numbering, limited to the subset this catalog
/// implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Iload = 0x15,
    Iaload = 0x2e,
    Istore = 0x36,
    Iastore = 0x4f,
    Pop = 0x57,
    Dup = 0x59,
    Swap = 0x5f,
    Iadd = 0x60,
    Isub = 0x64,
    Imul = 0x68,
    Idiv = 0x6c,
    Irem = 0x70,
    Ineg = 0x74,
    Return = 0xb1,
    Goto = 0xa7,
    Ifeq = 0x99,
    Ifne = 0x9a,
    Tableswitch = 0xaa,
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Getfield = 0xb4,
    Putfield = 0xb5,
    Invokestatic = 0xb8,
    Wide = 0xc4,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Opcode::try_from(byte).ok()
    }
}
