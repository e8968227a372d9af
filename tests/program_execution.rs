//! Integration tests for whole-program execution
//!
//! Compiles a realistic choreography and replays it on a manual clock,
//! checking the exact order and timing of every motor intent.

use choreo::clock::{Clock, ManualClock};
use choreo::engine::{EngineHost, ExecutionContext, RuntimeMessage};
use choreo::language::{RuntimeParameters, TurnDirection, compile_program};
use choreo::shaft::DeviceId;
use chrono::{Duration, TimeZone, Utc};

const CHOREOGRAPHY: &str = "
def main():
    right(A, to=12, speed=1)

    0:06
    left(A, to=6, speed=4)
    left(B, to=6, speed=4)

def test(X):
    left(X, to=1, speed=2)

0:01
main()
test(A)

+0:03
left(B, to=10, speed=2)
main()

1:00
test(B)
right(B, to=10, speed=2)
";

/// Records motor intents the way an installation log would: one line per
/// turn, stamped with the simulated wall clock.
struct TranscriptHost {
    clock: ManualClock,
    lines: Vec<String>,
}

impl EngineHost for TranscriptHost {
    fn turn(
        &mut self,
        device: &DeviceId,
        direction: TurnDirection,
        section: Option<u32>,
        speed: u32,
    ) {
        let section = section.expect("every turn in this choreography has a target");
        self.lines.push(format!(
            "{} MOTOR {} TURN {} {} {}",
            self.clock.now().format("%Y-%m-%d %H:%M:%S"),
            device,
            direction,
            section,
            speed
        ));
    }

    fn stop(&mut self, device: &DeviceId) {
        self.lines.push(format!(
            "{} MOTOR {} STOP",
            self.clock.now().format("%Y-%m-%d %H:%M:%S"),
            device
        ));
    }

    fn runtime_message(&mut self, message: RuntimeMessage) {
        self.lines.push(message.message().to_string());
    }
}

#[test]
fn test_choreography_transcript() {
    let params = RuntimeParameters {
        num_turn_sections: 64,
        num_speeds: 5,
    };
    let devices = vec!["A".to_string(), "B".to_string()];
    let program = compile_program(CHOREOGRAPHY, &devices, &params)
        .into_program()
        .expect("choreography compiles");

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2019, 4, 9, 22, 5, 0).unwrap());
    let mut execution = ExecutionContext::new(
        program,
        devices.iter().map(|name| DeviceId::new(name)),
        clock.now(),
    );
    let mut host = TranscriptHost {
        clock: clock.clone(),
        lines: Vec::new(),
    };

    // The opening drain runs immediately; nothing is due again until the
    // first marker elapses.
    assert!(execution.execute_if_scheduled(clock.now(), &mut host));
    assert!(!execution.execute_if_scheduled(clock.now(), &mut host));

    for _ in 0..10_000 {
        clock.advance(Duration::milliseconds(100));
        execution.execute_if_scheduled(clock.now(), &mut host);
        if execution.terminated() {
            break;
        }
    }

    assert!(execution.terminated());
    assert_eq!(
        host.lines,
        vec![
            "2019-04-09 22:05:01 MOTOR A TURN right 12 1",
            "2019-04-09 22:05:06 MOTOR A TURN left 6 4",
            "2019-04-09 22:05:06 MOTOR B TURN left 6 4",
            "2019-04-09 22:05:06 MOTOR A TURN left 1 2",
            "2019-04-09 22:05:09 MOTOR B TURN left 10 2",
            "2019-04-09 22:05:09 MOTOR A TURN right 12 1",
            "Scheduling execution in the past",
            "2019-04-09 22:05:09 MOTOR A TURN left 6 4",
            "2019-04-09 22:05:09 MOTOR B TURN left 6 4",
            "2019-04-09 22:06:00 MOTOR B TURN left 1 2",
            "2019-04-09 22:06:00 MOTOR B TURN right 10 2",
        ]
    );
}

#[test]
fn test_looping_choreography_repeats_with_restart() {
    let params = RuntimeParameters {
        num_turn_sections: 64,
        num_speeds: 5,
    };
    let devices = vec!["A".to_string()];
    let program = compile_program(
        "0:01\nleft(A, to=3, speed=1)\n+0:01\nstop(A)\nrestart()\n",
        &devices,
        &params,
    )
    .into_program()
    .expect("loop compiles");

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2019, 4, 9, 22, 5, 0).unwrap());
    let mut execution = ExecutionContext::new(program, [DeviceId::new("A")], clock.now());
    let mut host = TranscriptHost {
        clock: clock.clone(),
        lines: Vec::new(),
    };

    // Run long enough for three full passes of the two-second loop body.
    for _ in 0..70 {
        execution.execute_if_scheduled(clock.now(), &mut host);
        clock.advance(Duration::milliseconds(100));
    }

    assert!(!execution.terminated());
    assert_eq!(
        host.lines,
        vec![
            "2019-04-09 22:05:01 MOTOR A TURN left 3 1",
            "2019-04-09 22:05:02 MOTOR A STOP",
            "2019-04-09 22:05:03 MOTOR A TURN left 3 1",
            "2019-04-09 22:05:04 MOTOR A STOP",
            "2019-04-09 22:05:05 MOTOR A TURN left 3 1",
            "2019-04-09 22:05:06 MOTOR A STOP",
        ]
    );
}
