use std::io::{self, Write};

use tokio::sync::mpsc;

use crate::chat::connector::{CloseReason, ConnectionManager, ConnectionStatus, SessionEvent};
use crate::chat::error::ConnectorError;
use crate::chat::log::Role;
use crate::chat::target::ChannelKind;

pub const QUIT_COMMAND: &str = "/quit";

enum Turn {
    Input(Option<String>),
    Session(Option<SessionEvent>),
}

/// Line-oriented front end for one connected [`ConnectionManager`].
///
/// Lines from `input` are sent as chat messages; events are written to
/// `output` as they arrive. Returns the status the connection ended in.
pub async fn run_console<W: Write>(
    manager: &mut ConnectionManager,
    input: &mut mpsc::Receiver<String>,
    output: &mut W,
) -> io::Result<ConnectionStatus> {
    let label = match manager.target().map(|target| target.kind()) {
        Some(ChannelKind::Assistant) => "assistant",
        _ => "room",
    };

    loop {
        let turn = tokio::select! {
            line = input.recv() => Turn::Input(line),
            event = manager.next_event() => Turn::Session(event),
        };

        match turn {
            Turn::Input(None) => break,
            Turn::Input(Some(line)) => {
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim() == QUIT_COMMAND {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                match manager.send(line) {
                    Ok(()) => {}
                    Err(ConnectorError::NotReady) => {
                        writeln!(output, "! connection not ready; message not sent")?;
                    }
                    Err(err) => writeln!(output, "! {err}")?,
                }
            }
            Turn::Session(None) => break,
            Turn::Session(Some(SessionEvent::Message(entry))) => {
                if entry.role == Role::Remote {
                    writeln!(output, "{label}> {}", entry.text)?;
                }
            }
            Turn::Session(Some(SessionEvent::Error(err))) => {
                writeln!(output, "! {err}")?;
            }
            Turn::Session(Some(SessionEvent::Status(status))) => {
                describe(status, manager, output)?;
                if matches!(status, ConnectionStatus::Closed(_)) {
                    break;
                }
            }
        }
        output.flush()?;
    }

    output.flush()?;
    Ok(manager.status())
}

fn describe<W: Write>(
    status: ConnectionStatus,
    manager: &ConnectionManager,
    output: &mut W,
) -> io::Result<()> {
    let resource = manager
        .target()
        .map(|target| target.resource_id().to_string())
        .unwrap_or_default();
    match status {
        ConnectionStatus::Idle | ConnectionStatus::Connecting => Ok(()),
        ConnectionStatus::Open => writeln!(
            output,
            "* connected to {resource} (type {QUIT_COMMAND} to leave)"
        ),
        ConnectionStatus::Closed(CloseReason::Unauthorized) => writeln!(
            output,
            "* session expired or not allowed in {resource}; log in again"
        ),
        ConnectionStatus::Closed(CloseReason::Normal) => {
            writeln!(output, "* connection closed")
        }
        ConnectionStatus::Closed(reason) => {
            writeln!(output, "* connection lost ({reason})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::connector::SessionHandlers;
    use crate::chat::target::ConnectionTarget;
    use crate::session::SessionCredential;
    use crate::transport::mock::MockDialer;
    use crate::transport::websocket::EndpointConfig;
    use std::sync::Arc;

    fn connected(dialer: &MockDialer, target: ConnectionTarget) -> ConnectionManager {
        let mut manager = ConnectionManager::new(
            Arc::new(dialer.clone()),
            EndpointConfig::new().ws_base_url("ws://chat.test"),
        );
        let credential = SessionCredential::new("t1", "bearer").unwrap();
        manager
            .connect(target, &credential, SessionHandlers::new())
            .unwrap();
        manager
    }

    #[test_timeout::tokio_timeout_test]
    async fn relays_lines_and_prints_remote_messages() {
        let dialer = MockDialer::new();
        let mut manager = connected(&dialer, ConnectionTarget::assistant("c-1"));
        let mut remote = dialer.take_remote().unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        remote.open();
        remote.message("hola");
        remote.close(1000);
        let mut output = Vec::new();
        let status = run_console(&mut manager, &mut rx, &mut output).await.unwrap();
        drop(tx);

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("* connected to c-1"));
        assert!(printed.contains("assistant> hola"));
        assert!(printed.contains("* connection closed"));
        assert_eq!(status, ConnectionStatus::Closed(CloseReason::Normal));
        assert!(remote.sent().is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn blank_lines_are_skipped_and_quit_stops() {
        let dialer = MockDialer::new();
        let mut manager = connected(&dialer, ConnectionTarget::room("R1"));
        let mut remote = dialer.take_remote().unwrap();
        remote.open();
        manager.next_event().await;

        let (tx, mut rx) = mpsc::channel(8);
        for line in ["hello", "   ", "second\n", QUIT_COMMAND, "never"] {
            tx.send(line.to_string()).await.unwrap();
        }
        let mut output = Vec::new();
        let status = run_console(&mut manager, &mut rx, &mut output).await.unwrap();

        assert_eq!(status, ConnectionStatus::Open);
        assert_eq!(remote.sent(), vec!["hello".to_string(), "second".to_string()]);
    }

    #[test_timeout::tokio_timeout_test]
    async fn reports_not_ready_inline() {
        let dialer = MockDialer::new();
        let mut manager = connected(&dialer, ConnectionTarget::room("R1"));
        let mut remote = dialer.take_remote().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        tx.send("too early".to_string()).await.unwrap();
        drop(tx);
        let mut output = Vec::new();
        run_console(&mut manager, &mut rx, &mut output).await.unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("connection not ready"));
        assert!(remote.sent().is_empty());
        assert!(manager.messages().is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn unauthorized_close_ends_console() {
        let dialer = MockDialer::new();
        let mut manager = connected(&dialer, ConnectionTarget::room("R1"));
        let remote = dialer.take_remote().unwrap();
        remote.close(1008);

        let (_tx, mut rx) = mpsc::channel(8);
        let mut output = Vec::new();
        let status = run_console(&mut manager, &mut rx, &mut output).await.unwrap();

        assert_eq!(status, ConnectionStatus::Closed(CloseReason::Unauthorized));
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("session expired"));
    }
}
