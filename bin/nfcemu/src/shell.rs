//! Interactive stand-in for the card interface

use nfcemu_apdu::hex::parse_hex;
use nfcemu_core::Emulator;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "\
Commands:
  <hex>           - Send an APDU to the card (e.g. '00A4040007F001020304050600')
  deactivate      - The reader leaves the field
  status          - Show status, scenario cursor and state version
  json <payload>  - Apply a command payload
  log             - Show the communication log
  help            - Show this help
  exit            - Exit the shell";

/// What a shell line produced
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Reply {
    /// Text to print
    Output(String),
    /// Nothing to print
    Silent,
    /// Leave the shell
    Quit,
}

/// Interpret one line of input
pub(crate) fn handle(emulator: &Emulator, line: &str) -> Reply {
    let input = line.trim();
    if input.is_empty() {
        return Reply::Silent;
    }

    let (directive, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
    match directive.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "q" => Reply::Quit,
        "help" | "?" => Reply::Output(HELP.to_string()),
        "deactivate" => {
            emulator.on_deactivated();
            Reply::Output("Deactivated".to_string())
        }
        "status" => {
            let snapshot = emulator.engine().snapshot();
            Reply::Output(format!(
                "{} scenario={} running={} silenced={} step={}/{} selected={} version={}",
                emulator.status().current(),
                snapshot.current.as_deref().unwrap_or("-"),
                snapshot.running,
                snapshot.silenced,
                snapshot.step_index,
                snapshot.step_count,
                snapshot.is_selected,
                emulator.clock().current(),
            ))
        }
        "json" => {
            let outcome = emulator.router().apply(rest.trim());
            Reply::Output(if outcome.applied { "Applied" } else { "Rejected" }.to_string())
        }
        "log" => Reply::Output(
            emulator
                .log()
                .entries()
                .iter()
                .map(|e| format!("{} {}", e.timestamp.format("%H:%M:%S%.3f"), e.message))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => match parse_hex(input) {
            Ok(command) => match emulator.process_apdu(&command) {
                Some(response) => Reply::Output(response.to_hex()),
                None => Reply::Output("(no response)".to_string()),
            },
            Err(e) => Reply::Output(format!("Invalid input: {e}")),
        },
    }
}

/// Read lines from stdin until EOF or `exit`
pub(crate) async fn run(emulator: Emulator) -> eyre::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"APDU Shell - Enter commands in hex format or 'help' for assistance\n")
        .await?;
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match handle(&emulator, &line) {
            Reply::Quit => break,
            Reply::Silent => {}
            Reply::Output(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(reply: Reply) -> String {
        match reply {
            Reply::Output(text) => text,
            other => panic!("expected output, got {other:?}"),
        }
    }

    #[test]
    fn test_scripted_session() {
        let logs = tempfile::tempdir().unwrap();
        let emulator = Emulator::in_memory(logs.path());

        let payload = r#"json {"Scenarios":{"Add":{"name":"pay","aid":"F0010203040506","steps":[{"name":"sel","type":"Select","aid":"F0010203040506"},{"name":"gpo","request":"80A80000","response":"6F009000"}]},"Current":"pay"}}"#;
        assert_eq!(output(handle(&emulator, payload)), "Applied");
        let start = r#"json {"Comm":{"CurrentScenario":"Start"}}"#;
        assert_eq!(output(handle(&emulator, start)), "Applied");
        assert!(output(handle(&emulator, "status")).starts_with("RUNNING scenario=pay"));

        assert_eq!(output(handle(&emulator, "00A4040007F0010203040506")), "9000");
        assert_eq!(output(handle(&emulator, "80 A8 00 00")), "6F009000");
        assert_eq!(output(handle(&emulator, "status")).split(' ').next(), Some("FINISHED"));

        assert_eq!(output(handle(&emulator, "deactivate")), "Deactivated");
        assert!(output(handle(&emulator, "log")).contains("RESP: 6F009000"));
    }

    #[test]
    fn test_directives_and_bad_input() {
        let logs = tempfile::tempdir().unwrap();
        let emulator = Emulator::in_memory(logs.path());

        assert_eq!(handle(&emulator, "   "), Reply::Silent);
        assert_eq!(handle(&emulator, "EXIT"), Reply::Quit);
        assert!(output(handle(&emulator, "help")).contains("deactivate"));
        assert!(output(handle(&emulator, "zz")).starts_with("Invalid input"));
        assert_eq!(output(handle(&emulator, "json {")), "Rejected");
    }
}
