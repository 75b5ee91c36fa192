//! `State`: the heap, static area, thread stack, path condition, and flags
//! that together describe one point along one explored execution path.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use symex_core::{Calculator, Signature, TermIdGenerator, Value};

use crate::class_hierarchy::ClassHierarchy;
use crate::error::{EngineError, Result};
use crate::frame::{Bytecode, Frame, ThreadStack};
use crate::heap::{Heap, HeapPos};
use crate::objekt::{Instance, Klass, Objekt};
use crate::path_condition::PathCondition;

/// The terminal status of a state.
#[derive(Debug, Clone, PartialEq)]
pub enum Stuck {
    /// Still running.
    None,
    /// The root method returned.
    Return,
    /// An uncaught exception propagated past the outermost frame; carries
    /// the reference to the thrown object.
    Exception(Value),
    /// No algorithm is registered for the current opcode.
    Unsupported(u8),
}

impl Stuck {
    pub fn is_stuck(&self) -> bool {
        !matches!(self, Stuck::None)
    }
}

/// One point along one explored path: mutable state (heap, static area,
/// thread stack, path condition, flags) plus borrowed references to the
/// process-wide, effectively immutable services (class hierarchy,
/// calculator). `Clone` deep-copies the mutable part and bumps the `Rc`
/// refcount on the services, giving forks independent siblings without
/// duplicating the value algebra or the class hierarchy.
#[derive(Clone)]
pub struct State {
    heap: Heap,
    static_area: FxHashMap<Rc<str>, Klass>,
    thread_stack: ThreadStack,
    path_condition: PathCondition,
    term_ids: TermIdGenerator,
    /// Literal -> interned `java/lang/String` instance.
    string_pool: FxHashMap<Rc<str>, HeapPos>,
    /// Heap position -> the textual origin of the symbolic reference whose
    /// `EXPANDS` resolution allocated it (§4.4). Populated only for objects
    /// created that way; a `MayAlias` LICS rule matches against this, not
    /// against the reference currently being resolved.
    allocation_origins: FxHashMap<HeapPos, Rc<str>>,

    stuck: Stuck,
    wide: bool,
    identifier: String,
    sequence_number: u64,
    depth: u32,

    class_hierarchy: Rc<dyn ClassHierarchy>,
    calculator: Rc<Calculator>,
}

impl State {
    pub fn new(
        root_signature: Signature,
        code: Bytecode,
        locals: Vec<Value>,
        class_hierarchy: Rc<dyn ClassHierarchy>,
        calculator: Rc<Calculator>,
    ) -> Self {
        let mut thread_stack = ThreadStack::new();
        thread_stack.push(Frame::new(root_signature, code, locals, 0));
        Self {
            heap: Heap::new(),
            static_area: FxHashMap::default(),
            thread_stack,
            path_condition: PathCondition::new(),
            term_ids: TermIdGenerator::new(),
            string_pool: FxHashMap::default(),
            allocation_origins: FxHashMap::default(),
            stuck: Stuck::None,
            wide: false,
            identifier: String::new(),
            sequence_number: 0,
            depth: 0,
            class_hierarchy,
            calculator,
        }
    }

    fn current_frame(&self) -> Result<&Frame> {
        self.thread_stack.current().ok_or(EngineError::ThreadStackEmpty)
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame> {
        self.thread_stack.current_mut().ok_or(EngineError::ThreadStackEmpty)
    }

    /// The bytecode byte at `pc + offset` in the current frame.
    pub fn get_instruction(&self, offset: i64) -> Result<u8> {
        let frame = self.current_frame()?;
        frame.byte_at(offset).ok_or_else(|| EngineError::InvalidProgramCounter {
            pc: frame.pc(),
            len: frame.code_len(),
        })
    }

    /// Advance the current frame's pc by `delta`.
    pub fn inc_pc(&mut self, delta: i32) -> Result<()> {
        let (pc, len) = {
            let frame = self.current_frame()?;
            (frame.pc(), frame.code_len())
        };
        let frame = self.current_frame_mut()?;
        if !frame.inc_pc(delta) {
            return Err(EngineError::InvalidProgramCounter { pc, len });
        }
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        self.current_frame_mut()?.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.current_frame_mut()?
            .pop()
            .ok_or_else(|| EngineError::UnexpectedInternal("operand stack underflow".to_string()))
    }

    pub fn top(&self) -> Result<&Value> {
        self.current_frame()?
            .top()
            .ok_or_else(|| EngineError::UnexpectedInternal("operand stack is empty".to_string()))
    }

    pub fn current_signature(&self) -> Result<&Signature> {
        Ok(self.current_frame()?.signature())
    }

    /// Allocate an instance of `class_name`, then walk the thread stack from
    /// the current frame outward looking for a handler whose range covers
    /// the throwing pc and whose catch type admits the exception; unwinds
    /// frames with no match. If the stack empties first, `stuck` becomes
    /// `Exception`.
    pub fn create_throwable_and_throw_it(&mut self, class_name: &str) -> Result<()> {
        let instance = Objekt::Instance(Instance::new(Rc::from(class_name)));
        let pos = self.heap.allocate(instance);
        let exception_ref = Value::ReferenceConcrete(Some(pos));

        loop {
            let Some(frame) = self.thread_stack.current() else {
                self.stuck = Stuck::Exception(exception_ref);
                return Ok(());
            };
            let handler_pc = self
                .class_hierarchy
                .get_class_file(&frame.signature().class_name)
                .ok()
                .and_then(|class_file| {
                    class_file.find_method(&frame.signature().member_name, &frame.signature().descriptor)
                })
                .and_then(|method| method.handler_for(frame.pc(), class_name, self.class_hierarchy.as_ref()));

            match handler_pc {
                Some(handler_pc) => {
                    let frame = self.current_frame_mut()?;
                    frame.set_pc(handler_pc);
                    frame.push(exception_ref);
                    return Ok(());
                }
                None => {
                    self.thread_stack.pop();
                }
            }
        }
    }

    pub fn class_hierarchy(&self) -> &dyn ClassHierarchy {
        self.class_hierarchy.as_ref()
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    pub fn term_ids(&self) -> &TermIdGenerator {
        &self.term_ids
    }

    /// Record `pos`'s allocation-site origin (the textual origin of the
    /// symbolic reference whose `EXPANDS` resolution created it).
    pub fn record_allocation_origin(&mut self, pos: HeapPos, origin: Rc<str>) {
        self.allocation_origins.insert(pos, origin);
    }

    /// `pos`'s allocation-site origin, if it was created by an `EXPANDS`
    /// resolution; `None` for objects allocated any other way (string
    /// interning, exception construction).
    pub fn allocation_origin(&self, pos: HeapPos) -> Option<&Rc<str>> {
        self.allocation_origins.get(&pos)
    }

    pub fn get_klass(&self, class_name: &str) -> Option<&Klass> {
        self.static_area.get(class_name)
    }

    pub fn get_klass_mut(&mut self, class_name: &str) -> Option<&mut Klass> {
        self.static_area.get_mut(class_name)
    }

    pub fn insert_klass(&mut self, klass: Klass) {
        self.static_area.insert(Rc::from(klass.class_name()), klass);
    }

    /// Intern a UTF-8 literal: returns the existing heap reference for an
    /// equal literal, or allocates a fresh immutable `java/lang/String`.
    pub fn reference_to_string_literal(&mut self, utf8: impl Into<Rc<str>>) -> Value {
        let utf8 = utf8.into();
        if let Some(&pos) = self.string_pool.get(&utf8) {
            return Value::ReferenceConcrete(Some(pos));
        }
        let mut instance = Instance::new(Rc::from("java/lang/String"));
        instance
            .put_field_value(
                Signature::new("java/lang/String", "Ljava/lang/String;", "value"),
                Value::ConstantPoolString(utf8.clone()),
            )
            .expect("constant-pool string literal is always reference-compatible");
        let pos = self.heap.allocate(Objekt::Instance(instance));
        self.string_pool.insert(utf8, pos);
        Value::ReferenceConcrete(Some(pos))
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn thread_stack(&self) -> &ThreadStack {
        &self.thread_stack
    }

    pub fn thread_stack_mut(&mut self) -> &mut ThreadStack {
        &mut self.thread_stack
    }

    pub fn path_condition(&self) -> &PathCondition {
        &self.path_condition
    }

    pub fn path_condition_mut(&mut self) -> &mut PathCondition {
        &mut self.path_condition
    }

    pub fn stuck(&self) -> &Stuck {
        &self.stuck
    }

    pub fn set_stuck(&mut self, stuck: Stuck) {
        self.stuck = stuck;
    }

    pub fn wide(&self) -> bool {
        self.wide
    }

    pub fn set_wide(&mut self, wide: bool) {
        self.wide = wide;
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn push_identifier_suffix(&mut self, suffix: char) {
        self.identifier.push(suffix);
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn increment_sequence_number(&mut self) {
        self.sequence_number += 1;
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn increment_depth(&mut self) {
        self.depth += 1;
    }
}
