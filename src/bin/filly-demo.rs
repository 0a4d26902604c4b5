// Headless demo host.  Assembles a small opcode program by hand (the
// compiler normally does this), then drives the engine at 60 Hz and
// prints what the script painted.
//
// Run with RUST_LOG=info for the engine's operation log.

use std::time::Duration;

use crossbeam_channel::tick;

use filly::{commands, BinOp, Engine, EventKind, Opcode, TickOutcome, TimingMode, Value};

fn main() {
    env_logger::init();

    let engine = Engine::headless();

    // Backdrop and a small red sprite source.
    let stage = engine.create_pic(160, 120);
    let sprite = engine.create_pic(8, 8);
    engine.fill_pic(sprite, 0xFF0000).unwrap();
    engine
        .open_win(stage, 40, 40, 160, 120, 0, 0, 0xFFFFFF)
        .unwrap();

    // main: put a cast, then walk it across the stage one step at a
    // time, one wait per move.
    engine.execute_top_level(vec![Opcode::DefineFunc {
        name: "main".into(),
        params: vec![],
        body: commands(vec![
            Opcode::assign(
                "c",
                Opcode::call(
                    "put_cast",
                    vec![
                        Opcode::int(stage),
                        Opcode::int(sprite),
                        Opcode::int(0),
                        Opcode::int(0),
                        Opcode::int(0),
                        Opcode::int(0),
                        Opcode::int(8),
                        Opcode::int(8),
                        Opcode::int(-1),
                    ],
                ),
            ),
            Opcode::assign("result", Opcode::var("c")),
        ]),
    }]);
    let _ = engine.call_main();

    // A walker script: 10 steps right, waiting one step unit between
    // moves.
    let cast_id = 1; // first cast
    let walker = engine.register_sequence(
        vec![
            Opcode::SetStep(Box::new(Opcode::int(1))),
            Opcode::For {
                init: Box::new(Opcode::assign("x", Opcode::int(0))),
                cond: Box::new(Opcode::infix(BinOp::Lt, Opcode::var("x"), Opcode::int(10))),
                post: Box::new(Opcode::assign(
                    "x",
                    Opcode::infix(BinOp::Add, Opcode::var("x"), Opcode::int(1)),
                )),
                body: vec![
                    Opcode::call(
                        "move_cast",
                        vec![
                            Opcode::int(cast_id),
                            Opcode::infix(BinOp::Mul, Opcode::var("x"), Opcode::int(10)),
                            Opcode::int(20),
                        ],
                    ),
                    Opcode::wait(1),
                ],
            },
        ],
        TimingMode::Time,
    );

    // A handler fired when the walk is over.
    engine.register_event_handler(
        EventKind::User,
        vec![Opcode::assign("done", Opcode::var("MesP1"))],
        TimingMode::Time,
        1,
    );

    // 60 Hz frame loop, until the walker finishes (or the safety net).
    let frames = tick(Duration::from_micros(16_667));
    let mut frame_count = 0u64;
    loop {
        frames.recv().expect("frame clock");
        match engine.update() {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::Terminated) => break,
            Err(e) => {
                eprintln!("engine error: {e}");
                break;
            }
        }
        engine.render();
        frame_count += 1;
        if !engine.sequence_active(walker) || frame_count > 600 {
            break;
        }
    }

    engine.trigger_user_event(1, &[Value::Int(1)]);
    let pixel = engine.get_color(stage, 92, 22).unwrap_or(-1);
    println!("ran {frame_count} frames; pixel under the sprite's final step: {pixel:#08x}");
}
