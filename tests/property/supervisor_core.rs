use proptest::prelude::*;
use proofrun::engine::{
    CoreCommand, CoreReply, ExitClass, Rejection, SupervisorCore, SupervisorEvent,
};

/// Abstract operations; exits refer to a generation by offset from the most
/// recently started one, so stale and future generations show up too.
#[derive(Debug, Clone)]
enum Op {
    Start,
    Cancel,
    Exit { back: u64, code: i32 },
    SpawnFailed { back: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Start),
        2 => Just(Op::Cancel),
        3 => (0u64..3, -15i32..3).prop_map(|(back, code)| Op::Exit { back, code }),
        1 => (0u64..2).prop_map(|back| Op::SpawnFailed { back }),
    ]
}

fn exit_class(code: i32) -> ExitClass {
    match code {
        0 => ExitClass::Success,
        c if c < 0 => ExitClass::Cancelled(-c),
        c => ExitClass::Failed(c),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn at_most_one_live_task(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut core = SupervisorCore::new();
        let mut last_started = 0u64;
        // Generation of the task the model believes is live.
        let mut live: Option<u64> = None;

        for op in ops {
            match op {
                Op::Start => {
                    let step = core.step(SupervisorEvent::StartRequested);
                    match live {
                        Some(_) => prop_assert_eq!(
                            step.reply,
                            CoreReply::Rejected(Rejection::AlreadyRunning)
                        ),
                        None => {
                            let CoreReply::Started { generation } = step.reply else {
                                return Err(TestCaseError::fail(format!("start refused: {:?}", step.reply)));
                            };
                            prop_assert!(generation > last_started);
                            prop_assert_eq!(step.commands, vec![CoreCommand::Spawn { generation }]);
                            last_started = generation;
                            live = Some(generation);
                        }
                    }
                }
                Op::Cancel => {
                    let step = core.step(SupervisorEvent::CancelRequested);
                    match live {
                        None => {
                            prop_assert_eq!(step.reply, CoreReply::Rejected(Rejection::NotRunning));
                            prop_assert!(step.commands.is_empty());
                        }
                        Some(generation) => {
                            prop_assert_eq!(step.reply, CoreReply::Cancelling { generation });
                        }
                    }
                }
                Op::Exit { back, code } => {
                    let generation = last_started.saturating_sub(back);
                    let step = core.step(SupervisorEvent::ProcessExited {
                        generation,
                        exit: exit_class(code),
                    });
                    if live == Some(generation) {
                        prop_assert_eq!(step.commands.len(), 1);
                        live = None;
                    } else {
                        prop_assert!(step.commands.is_empty());
                    }
                }
                Op::SpawnFailed { back } => {
                    let generation = last_started.saturating_sub(back);
                    core.step(SupervisorEvent::SpawnFailed { generation });
                    if live == Some(generation) {
                        live = None;
                    }
                }
            }

            prop_assert_eq!(core.is_running(), live.is_some());
        }
    }
}
