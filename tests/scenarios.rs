//! End-to-end coverage of the six concrete scenarios, driven through
//! [`Engine::step`] against the public API rather than calling an
//! `Algorithm` directly, so dispatch (`Opcode::from_byte` ->
//! `algorithm_for`) is exercised along with each algorithm's behavior.

use std::rc::Rc;

use symex::algo::StepContext;
use symex::class_hierarchy::AccessFlags;
use symex::decision::TrivialDecisionProcedure;
use symex::{ClassFile, ClassHierarchy, Engine, FieldInfo, LicsEffect, LicsRule, LicsRules, MethodInfo, State, Stuck, TestClassHierarchy};
use symex_core::{Calculator, Signature, Simplex, Value};

fn ctx<'a>(dp: &'a mut TrivialDecisionProcedure, rules: &'a LicsRules) -> StepContext<'a> {
    StepContext {
        decision_procedure: dp,
        lics_rules: rules,
        heap_scope: None,
    }
}

fn step(state: &mut State, dp: &mut TrivialDecisionProcedure, rules: &LicsRules) -> Vec<State> {
    Engine::new(ctx(dp, rules)).step(state).unwrap()
}

/// Scenario 1: `getstatic` of a compile-time-constant field reads
/// `constant_value` directly, no `<clinit>` runs, pc advances by 3.
#[test]
fn getstatic_of_compile_time_constant_skips_clinit() {
    let field_sig = Signature::new("pkg/K", "I", "C");
    let main_sig = Signature::new("pkg/Main", "()V", "main");
    let hierarchy = TestClassHierarchy::new()
        .with_class(ClassFile {
            name: Rc::from("pkg/K"),
            super_class: None,
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: field_sig.clone(),
                access_flags: AccessFlags::STATIC | AccessFlags::FINAL,
                constant_value: Some(Simplex::Int(42)),
            }],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        })
        .with_class(ClassFile {
            name: Rc::from("pkg/Main"),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![MethodInfo {
                signature: main_sig.clone(),
                access_flags: AccessFlags::STATIC,
                code: Some(Rc::from(vec![0xb2u8, 0x00, 0x00])),
                max_locals: 0,
                handlers: vec![],
                constant_pool: vec![field_sig],
            }],
            access_flags: AccessFlags::PUBLIC,
        });

    let mut state = State::new(main_sig, Rc::from(vec![0xb2u8, 0x00, 0x00]), vec![], Rc::new(hierarchy), Rc::new(Calculator::default()));
    let mut dp = TrivialDecisionProcedure::default();
    let rules = LicsRules::default();

    let successors = step(&mut state, &mut dp, &rules);
    assert!(successors.is_empty());
    assert_eq!(state.pop().unwrap(), Value::Simplex(Simplex::Int(42)));
    assert_eq!(state.thread_stack().current().unwrap().pc(), 3);
    assert!(state.get_klass("pkg/K").is_none());
}

/// Scenario 2: `getstatic` of a field whose class has a `<clinit>` defers
/// first, re-executing once the `<clinit>` frame (which itself ends with
/// `return`) completes — yielding the value `<clinit>` stored.
#[test]
fn getstatic_triggers_clinit_then_reexecutes_with_initialized_value() {
    let field_sig = Signature::new("pkg/K", "I", "total");
    let main_sig = Signature::new("pkg/Main", "()V", "main");
    // <clinit>: iconst_5, putstatic #0, return
    let clinit_code: Rc<[u8]> = Rc::from(vec![0x08u8, 0xb3, 0x00, 0x00, 0xb1]);
    let hierarchy = TestClassHierarchy::new()
        .with_class(ClassFile {
            name: Rc::from("pkg/K"),
            super_class: None,
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: field_sig.clone(),
                access_flags: AccessFlags::STATIC,
                constant_value: None,
            }],
            methods: vec![MethodInfo {
                signature: Signature::new("pkg/K", "()V", "<clinit>"),
                access_flags: AccessFlags::STATIC,
                code: Some(clinit_code),
                max_locals: 0,
                handlers: vec![],
                constant_pool: vec![field_sig.clone()],
            }],
            access_flags: AccessFlags::PUBLIC,
        })
        .with_class(ClassFile {
            name: Rc::from("pkg/Main"),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![MethodInfo {
                signature: main_sig.clone(),
                access_flags: AccessFlags::STATIC,
                code: Some(Rc::from(vec![0xb2u8, 0x00, 0x00])),
                max_locals: 0,
                handlers: vec![],
                constant_pool: vec![field_sig.clone()],
            }],
            access_flags: AccessFlags::PUBLIC,
        });

    let mut state = State::new(main_sig, Rc::from(vec![0xb2u8, 0x00, 0x00]), vec![], Rc::new(hierarchy), Rc::new(Calculator::default()));
    let mut dp = TrivialDecisionProcedure::default();
    let rules = LicsRules::default();

    // getstatic: no Klass yet, pushes <clinit>, pc does not advance.
    assert!(step(&mut state, &mut dp, &rules).is_empty());
    assert_eq!(state.thread_stack().depth(), 2);
    assert_eq!(state.thread_stack().current().unwrap().pc(), 0);

    // <clinit>: iconst_5
    assert!(step(&mut state, &mut dp, &rules).is_empty());
    // <clinit>: putstatic #0 (total = 5)
    assert!(step(&mut state, &mut dp, &rules).is_empty());
    // <clinit>: return — pops back to Main, whose pc is still at getstatic.
    assert!(step(&mut state, &mut dp, &rules).is_empty());
    assert_eq!(state.thread_stack().depth(), 1);
    assert_eq!(state.thread_stack().current().unwrap().pc(), 0);

    // getstatic re-executes: Klass now exists, reads the initialized value.
    assert!(step(&mut state, &mut dp, &rules).is_empty());
    assert_eq!(state.pop().unwrap(), Value::Simplex(Simplex::Int(5)));
    assert_eq!(state.thread_stack().current().unwrap().pc(), 3);
}

/// Scenario 3: an array load with a symbolic index and a symbolic length
/// forks into an in-bounds and an out-of-bounds successor.
#[test]
fn iaload_with_symbolic_index_and_length_forks_in_and_out_of_bounds() {
    use symex_core::TypeTag;

    let main_sig = Signature::new("pkg/Main", "()V", "main");
    let locals = vec![Value::Term { ty: TypeTag::Int, id: 0 }, Value::Term { ty: TypeTag::Int, id: 1 }];
    let mut state = State::new(
        main_sig,
        Rc::from(vec![0x2eu8]),
        locals,
        Rc::new(TestClassHierarchy::new()),
        Rc::new(Calculator::default()),
    );
    let pos = state.heap_mut().allocate(symex::objekt::Objekt::Array(symex::objekt::ArrayObj::new(
        TypeTag::Int,
        Value::Term { ty: TypeTag::Int, id: 1 },
    )));
    state.push(Value::ReferenceConcrete(Some(pos))).unwrap();
    state.push(Value::Term { ty: TypeTag::Int, id: 0 }).unwrap();

    let mut dp = TrivialDecisionProcedure::default();
    let rules = LicsRules::default();
    let successors = step(&mut state, &mut dp, &rules);

    assert_eq!(successors.len(), 2);
    assert_eq!(successors[0].identifier(), "I");
    assert_eq!(successors[1].identifier(), "O");
    assert!(matches!(successors[1].stuck(), Stuck::Exception(_)));
}

/// Scenario 4: resolving a symbolic reference whose origin is pinned
/// non-null and to a single class by a LICS rule produces exactly one
/// `EXPANDS` successor; the `NULL` alternative is pruned before the
/// decision procedure is ever consulted.
#[test]
fn symbolic_getfield_receiver_pinned_by_lics_yields_single_expand() {
    /// Panics if `is_sat_null` is ever called — proves `NULL` was pruned
    /// by the LICS rule alone, never reaching the decision procedure.
    struct PanicsOnNullQuery(TrivialDecisionProcedure);
    impl symex::DecisionProcedure for PanicsOnNullQuery {
        fn set_assumptions(&mut self, pc: &symex::path_condition::PathCondition) -> Result<(), symex::DecisionError> {
            self.0.set_assumptions(pc)
        }
        fn push_assumption(&mut self, clause: &symex::path_condition::Clause) -> Result<(), symex::DecisionError> {
            self.0.push_assumption(clause)
        }
        fn is_sat(&mut self, condition: &Value) -> Result<bool, symex::DecisionError> {
            self.0.is_sat(condition)
        }
        fn is_sat_null(&mut self, _reference: &Value) -> Result<bool, symex::DecisionError> {
            panic!("NULL must be pruned by the never-null LICS rule without an SMT query");
        }
        fn is_sat_aliases(&mut self, reference: &Value, pos: symex::heap::HeapPos) -> Result<bool, symex::DecisionError> {
            self.0.is_sat_aliases(reference, pos)
        }
        fn is_sat_expands(&mut self, reference: &Value, class_name: &str) -> Result<bool, symex::DecisionError> {
            self.0.is_sat_expands(reference, class_name)
        }
        fn is_sat_initialized(&mut self, class_name: &str) -> Result<bool, symex::DecisionError> {
            self.0.is_sat_initialized(class_name)
        }
        fn is_sat_not_initialized(&mut self, class_name: &str) -> Result<bool, symex::DecisionError> {
            self.0.is_sat_not_initialized(class_name)
        }
        fn simplify(&mut self, primitive: &Value) -> Result<Value, symex::DecisionError> {
            self.0.simplify(primitive)
        }
        fn go_fast_and_imprecise(&mut self) {
            self.0.go_fast_and_imprecise()
        }
        fn stop_fast_and_imprecise(&mut self) {
            self.0.stop_fast_and_imprecise()
        }
        fn close(&mut self) {
            self.0.close()
        }
    }

    let field_sig = Signature::new("pkg/Node", "I", "value");
    let main_sig = Signature::new("pkg/Main", "()V", "main");
    let hierarchy = TestClassHierarchy::new()
        .with_class(ClassFile {
            name: Rc::from("pkg/Node"),
            super_class: None,
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: field_sig.clone(),
                access_flags: AccessFlags::PUBLIC,
                constant_value: None,
            }],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        })
        .with_class(ClassFile {
            name: Rc::from("pkg/Main"),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![MethodInfo {
                signature: main_sig.clone(),
                access_flags: AccessFlags::STATIC,
                code: Some(Rc::from(vec![0xb4u8, 0x00, 0x00])),
                max_locals: 0,
                handlers: vec![],
                constant_pool: vec![field_sig],
            }],
            access_flags: AccessFlags::PUBLIC,
        });

    let mut state = State::new(main_sig, Rc::from(vec![0xb4u8, 0x00, 0x00]), vec![], Rc::new(hierarchy), Rc::new(Calculator::default()));
    state
        .push(Value::ReferenceSymbolic { origin: Rc::from("ROOT.next"), id: 0 })
        .unwrap();

    let mut dp = PanicsOnNullQuery(TrivialDecisionProcedure::default());
    let rules = LicsRules::new(vec![
        LicsRule::new("ROOT.*", LicsEffect::NeverNull),
        LicsRule::new("ROOT.*", LicsEffect::MayExpandTo(Rc::from("pkg/Node"))),
    ]);

    let successors = step(&mut state, &mut dp, &rules);
    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].identifier(), "E");
}

/// Scenario 5: `idiv` with a concrete zero divisor throws
/// `ArithmeticException` without forking; pc is left unchanged.
#[test]
fn idiv_by_concrete_zero_throws_without_fork_or_pc_advance() {
    let main_sig = Signature::new("pkg/Main", "()V", "main");
    let mut state = State::new(main_sig, Rc::from(vec![0x6cu8]), vec![], Rc::new(TestClassHierarchy::new()), Rc::new(Calculator::default()));
    state.push(Value::Simplex(Simplex::Int(10))).unwrap();
    state.push(Value::Simplex(Simplex::Int(0))).unwrap();

    let mut dp = TrivialDecisionProcedure::default();
    let rules = LicsRules::default();
    let successors = step(&mut state, &mut dp, &rules);

    assert!(successors.is_empty());
    assert!(matches!(state.stuck(), Stuck::Exception(_)));
    assert_eq!(state.thread_stack().current().unwrap().pc(), 0);
}

/// Scenario 6: `wide` followed by `iload` widens the local-variable index
/// to 2 bytes; pc advances by 4 total (1 for `wide`, 3 for the widened
/// `iload`), and the one-shot `wide` flag clears.
#[test]
fn wide_iload_widens_index_and_advances_pc_by_four() {
    let main_sig = Signature::new("pkg/Main", "()V", "main");
    // [wide, iload, index_hi=0x00, index_lo=0x02]
    let mut state = State::new(
        main_sig,
        Rc::from(vec![0xc4u8, 0x15, 0x00, 0x02]),
        vec![Value::Simplex(Simplex::Int(0)); 4],
        Rc::new(TestClassHierarchy::new()),
        Rc::new(Calculator::default()),
    );
    state.thread_stack_mut().current_mut().unwrap().set_local(2, Value::Simplex(Simplex::Int(99)));

    let mut dp = TrivialDecisionProcedure::default();
    let rules = LicsRules::default();

    assert!(step(&mut state, &mut dp, &rules).is_empty());
    assert!(state.wide());
    assert!(step(&mut state, &mut dp, &rules).is_empty());

    assert!(!state.wide());
    assert_eq!(state.pop().unwrap(), Value::Simplex(Simplex::Int(99)));
    assert_eq!(state.thread_stack().current().unwrap().pc(), 4);
}
