// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Space slow mode,
// T toggle field-relative, H reset heading, P reset peak loop time,
// I/K arm, Q quit
//
// Prints OperatorCommand JSON lines on stdout at ~50Hz, so it can be piped
// straight into the station:
//     cargo run --example keyboard_teleop | cargo run -- drive
use std::io::Write;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use mecanum_station::messages::{DriveIntent, OperatorCommand};

const SPEEDS: [f64; 3] = [0.3, 0.6, 1.0]; // fraction of full power
const INPUT_TIMEOUT_MS: u64 = 100; // Reset intent after this much time with no input

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Space=slow, T=field/robot, H=reset heading, P=reset loop peak, I/K=arm, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop();
    disable_raw_mode()?;

    result
}

fn run_teleop() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut stdout = std::io::stdout();

    // Persistent intent state
    let mut intent = DriveIntent::default();
    let mut arm_power = 0.0;
    let mut slow = false;
    let mut last_movement_input = Instant::now();

    loop {
        // Buttons are only held for the message they were pressed in
        let mut toggle_field_relative = false;
        let mut reset_heading = false;
        let mut reset_loop_peak = false;

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))?
            && let Event::Key(KeyEvent { code, kind, .. }) = event::read()?
        {
            let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
            let speed = SPEEDS[speed_idx];

            match code {
                KeyCode::Char('w') if pressed => intent.forward = speed,
                KeyCode::Char('s') if pressed => intent.forward = -speed,
                KeyCode::Char('d') if pressed => intent.strafe = speed,
                KeyCode::Char('a') if pressed => intent.strafe = -speed,
                KeyCode::Char('x') if pressed => intent.turn = speed,
                KeyCode::Char('z') if pressed => intent.turn = -speed,
                KeyCode::Char('i') if pressed => arm_power = 1.0,
                KeyCode::Char('k') if pressed => arm_power = -1.0,
                KeyCode::Char(' ') if pressed => slow = true,

                KeyCode::Char('t') if pressed => toggle_field_relative = true,
                KeyCode::Char('h') if pressed => reset_heading = true,
                KeyCode::Char('p') if pressed => reset_loop_peak = true,

                // Speed control
                KeyCode::Char('r') if pressed => {
                    speed_idx = (speed_idx + 1).min(2);
                    print_speed(speed_idx);
                }
                KeyCode::Char('f') if pressed => {
                    speed_idx = speed_idx.saturating_sub(1);
                    print_speed(speed_idx);
                }

                // Quit
                KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                _ => {}
            }

            if matches!(
                code,
                KeyCode::Char('w' | 's' | 'a' | 'd' | 'z' | 'x' | 'i' | 'k' | ' ')
            ) {
                last_movement_input = Instant::now();
            }
        }

        // Reset intent if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            intent = DriveIntent::default();
            arm_power = 0.0;
            slow = false;
        }

        // Always publish at ~50Hz
        let cmd = OperatorCommand {
            drive: intent,
            slow_trigger: if slow { 1.0 } else { 0.0 },
            toggle_field_relative,
            reset_heading,
            arm_power,
            reset_loop_peak,
        };
        writeln!(stdout, "{}", serde_json::to_string(&cmd)?)?;
        stdout.flush()?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
