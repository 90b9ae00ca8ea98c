//! Property-based tests for the fiber
//!
//! These tests verify the stack invariants hold across arbitrary command
//! sequences.

use super::*;
use crate::message::Message;
use futures::executor::block_on;
use proptest::prelude::*;
use std::collections::VecDeque;

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Call,
    Done,
    Wait,
    Fail,
}

/// Steps through a fixed list of ops and logs every step it runs
struct Program {
    ops: VecDeque<Op>,
    log: Vec<String>,
}

impl Program {
    fn new(ops: &[Op]) -> Self {
        Self {
            ops: ops.iter().copied().collect(),
            log: Vec::new(),
        }
    }
}

#[async_trait]
impl Step for Program {
    async fn step(&mut self, frame: &mut Frame, input: Payload) -> FiberResult<Command> {
        // dialog state counts how often each frame ran
        let runs = frame.state.as_u64().unwrap_or(0) + 1;
        frame.state = Value::from(runs);
        self.log
            .push(format!("{}:{}:{runs}", frame.dialog, input.value_type()));

        match self.ops.pop_front() {
            Some(Op::Call) => Ok(Command::Call {
                child: DialogId::from(format!("d{}", self.log.len())),
                state: Value::Null,
                handler: "after".into(),
                result: ValueType::of::<String>(),
            }),
            Some(Op::Done) => Ok(Command::Done {
                value: TypedValue::new(&format!("v{}", self.log.len()))?,
            }),
            Some(Op::Wait) => Ok(Command::Wait {
                handler: "message".into(),
            }),
            Some(Op::Fail) => Err(FiberError::dialog("scripted failure")),
            None => Err(Violation::NoTerminal.into()),
        }
    }
}

fn message() -> Payload {
    Payload::Message(Message::text("next"))
}

/// A fiber suspended at depth `depth + 1`
fn fiber_at_depth(depth: usize) -> Fiber {
    let mut ops = vec![Op::Call; depth];
    ops.push(Op::Wait);
    let mut fiber = Fiber::default();
    block_on(fiber.start(Frame::start("root", Value::Null), &mut Program::new(&ops))).unwrap();
    fiber
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Call),
        3 => Just(Op::Done),
        2 => Just(Op::Wait),
        1 => Just(Op::Fail),
    ]
}

fn arb_program() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(arb_op(), 0..24)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// N nested calls without a done leave N+1 frames
    #[test]
    fn prop_nested_calls_add_one_frame_each(n in 0usize..32) {
        let fiber = fiber_at_depth(n);
        prop_assert_eq!(fiber.stack().depth(), n + 1);
        prop_assert_eq!(fiber.stack().top().unwrap().expects.clone(), ValueType::Message);
    }

    /// Each done that is not followed by a call removes exactly one frame
    #[test]
    fn prop_each_done_pops_one_frame(n in 1usize..16, k in 0usize..16) {
        let k = k.min(n);
        let mut fiber = fiber_at_depth(n);

        let mut ops = vec![Op::Done; k];
        ops.push(Op::Wait);
        let outcome = block_on(fiber.run_turn(message(), &mut Program::new(&ops))).unwrap();

        prop_assert_eq!(outcome, TurnOutcome::Waiting);
        prop_assert_eq!(fiber.stack().depth(), n + 1 - k);
    }

    /// Same stack and same input give the same stack, outcome and step log
    #[test]
    fn prop_turns_are_deterministic(depth in 0usize..6, ops in arb_program()) {
        let start = fiber_at_depth(depth);

        let mut first = start.clone();
        let mut first_program = Program::new(&ops);
        let first_result = block_on(first.run_turn(message(), &mut first_program));

        let serialized = serde_json::to_string(start.stack()).unwrap();
        let mut second = Fiber::from_stack(serde_json::from_str(&serialized).unwrap(), start.config());
        let mut second_program = Program::new(&ops);
        let second_result = block_on(second.run_turn(message(), &mut second_program));

        prop_assert_eq!(first.stack(), second.stack());
        prop_assert_eq!(&first_program.log, &second_program.log);
        match (first_result, second_result) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            (a, b) => prop_assert!(false, "diverged: {:?} vs {:?}", a, b),
        }
    }

    /// A failed turn commits nothing
    #[test]
    fn prop_failed_turn_leaves_stack_unchanged(depth in 0usize..6, ops in arb_program()) {
        let mut fiber = fiber_at_depth(depth);
        let before = fiber.stack().clone();

        let result = block_on(fiber.run_turn(message(), &mut Program::new(&ops)));

        match result {
            Err(_) => prop_assert_eq!(fiber.stack(), &before),
            Ok(TurnOutcome::Waiting) => {
                prop_assert!(!fiber.is_finished());
                prop_assert_eq!(fiber.stack().top().unwrap().expects.clone(), ValueType::Message);
            }
            Ok(TurnOutcome::Completed(_)) => prop_assert!(fiber.is_finished()),
        }
    }
}
