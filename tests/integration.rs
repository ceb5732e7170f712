//! Integration tests for port-agent-client.
//!
//! Each test runs a fake port agent on loopback: a data listener the client
//! connects to once, and a command listener that records every command line.

use std::time::Duration;

use port_agent_client::protocol::encode;
use port_agent_client::{ClientEvent, PacketType, PortAgentClient, PortAgentConfig, PortAgentError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

struct FakeAgent {
    data: TcpListener,
    data_port: u16,
    cmd_port: u16,
    commands: mpsc::UnboundedReceiver<String>,
}

impl FakeAgent {
    async fn start() -> Self {
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data.local_addr().unwrap().port();

        let cmd = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cmd_port = cmd.local_addr().unwrap().port();

        let (tx, commands) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = cmd.accept().await else {
                    break;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut line = String::new();
                    if stream.read_to_string(&mut line).await.is_ok() {
                        let _ = tx.send(line);
                    }
                });
            }
        });

        Self {
            data,
            data_port,
            cmd_port,
            commands,
        }
    }

    fn config(&self) -> PortAgentConfig {
        let mut config = PortAgentConfig::new("127.0.0.1", self.data_port, Some(self.cmd_port));
        config.poll_interval_ms = 10;
        config
    }

    async fn accept(&self) -> TcpStream {
        let (stream, _) = tokio::time::timeout(WAIT, self.data.accept())
            .await
            .expect("client never connected")
            .unwrap();
        stream
    }

    async fn next_command(&mut self) -> String {
        tokio::time::timeout(WAIT, self.commands.recv())
            .await
            .expect("no command received")
            .unwrap()
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no event received")
        .unwrap()
}

/// init_comms connects the data port and resyncs over the command port.
#[tokio::test]
async fn test_init_comms_resyncs_state() {
    let mut agent = FakeAgent::start().await;
    let (client, _events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let _data = agent.accept().await;

    // Each command gets its own connection, so arrival order is not fixed.
    let mut commands = vec![agent.next_command().await, agent.next_command().await];
    commands.sort();
    assert_eq!(commands, vec!["get_config\n", "get_state\n"]);
    assert!(client.is_connected());

    client.stop_comms().await;
}

/// Packets arrive in order with heartbeats filtered out, even when the agent
/// splits them across writes.
#[tokio::test]
async fn test_packets_delivered_in_order() {
    let agent = FakeAgent::start().await;
    let (client, mut events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let mut data = agent.accept().await;

    let mut wire = Vec::new();
    wire.extend_from_slice(&encode(b"first", PacketType::DataFromInstrument).unwrap());
    wire.extend_from_slice(&encode(b"", PacketType::Heartbeat).unwrap());
    wire.extend_from_slice(&encode(b"CONNECTED", PacketType::PortAgentStatus).unwrap());

    let (head, tail) = wire.split_at(7);
    data.write_all(head).await.unwrap();
    data.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    data.write_all(tail).await.unwrap();

    match next_event(&mut events).await {
        ClientEvent::Packet(packet) => {
            assert_eq!(packet.payload(), b"first");
            assert_eq!(packet.packet_type().unwrap(), PacketType::DataFromInstrument);
            assert!(packet.is_valid());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut events).await {
        ClientEvent::Packet(packet) => {
            assert_eq!(packet.packet_type().unwrap(), PacketType::PortAgentStatus);
            assert_eq!(
                packet.agent_status(),
                Some(port_agent_client::protocol::AgentStatus::Connected)
            );
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.stop_comms().await;
}

/// The agent closing the data socket produces exactly one fatal event.
#[tokio::test]
async fn test_remote_close_is_fatal_once() {
    let agent = FakeAgent::start().await;
    let (client, mut events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let data = agent.accept().await;
    drop(data);

    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Fatal(PortAgentError::ConnectionClosed)
    ));
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());

    client.stop_comms().await;
}

/// Bytes handed to `send` reach the agent unframed.
#[tokio::test]
async fn test_send_reaches_agent() {
    let agent = FakeAgent::start().await;
    let (client, _events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let mut data = agent.accept().await;

    assert_eq!(client.send(b"ts\r\n").await, 4);

    let mut buf = [0u8; 4];
    tokio::time::timeout(WAIT, data.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ts\r\n");

    client.stop_comms().await;
}

/// Commands issued by the owner go over the command port.
#[tokio::test]
async fn test_break_command() {
    let mut agent = FakeAgent::start().await;
    let (client, _events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.send_break(5).await.unwrap();
    assert_eq!(agent.next_command().await, "break 5\n");
}

/// stop_comms tears the connection down and may be repeated.
#[tokio::test]
async fn test_stop_comms_is_idempotent() {
    let agent = FakeAgent::start().await;
    let (client, mut events) = PortAgentClient::builder(agent.config())
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let mut data = agent.accept().await;

    client.stop_comms().await;
    client.stop_comms().await;
    assert_eq!(client.listener_state(), None);

    // The agent sees the socket close.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(WAIT, data.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    assert!(!matches!(
        next_event_or_none(&mut events).await,
        Some(ClientEvent::Fatal(_))
    ));
}

async fn next_event_or_none(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Option<ClientEvent> {
    tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .ok()
        .flatten()
}

/// A silent agent is declared dead once the heartbeat budget runs out.
#[tokio::test]
async fn test_silent_agent_fails_heartbeat() {
    let agent = FakeAgent::start().await;
    let mut config = agent.config();
    config.heartbeat_interval = 1;
    config.max_missed_heartbeats = 1;

    let (client, mut events) = PortAgentClient::builder(config)
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let _data = agent.accept().await;

    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Fatal(PortAgentError::HeartbeatTimeout { missed: 1 })
    ));
    assert!(!client.is_connected());

    client.stop_comms().await;
}

/// Without a command port, commands fail but the data side still works.
#[tokio::test]
async fn test_missing_command_port() {
    let agent = FakeAgent::start().await;
    let mut config = agent.config();
    config.cmd_port = None;

    let (client, _events) = PortAgentClient::builder(config)
        .build_with_channel()
        .unwrap();

    client.init_comms().await.unwrap();
    let _data = agent.accept().await;

    assert!(matches!(
        client.send_get_state().await,
        Err(PortAgentError::MissingCommandPort { .. })
    ));
    assert!(client.is_connected());

    client.stop_comms().await;
}
