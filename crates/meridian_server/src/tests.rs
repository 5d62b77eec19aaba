//! Socket-level scenario tests for the connection server.
//!
//! These drive a real `GameServer` over loopback TCP: registered formats
//! recognize packets by marker bytes and handlers write fixed replies, so
//! every assertion is on observable socket traffic.

use crate::players::InMemoryPlayerRegistry;
use crate::{GameServer, ServerConfig};
use async_trait::async_trait;
use meridian_commands::{
    ArgumentInfo, ArgumentKind, Command, CommandContext, CommandRequest, CommandResult,
};
use meridian_message_system::{
    DecodeFailure, DispatchError, HandlerContext, ManualClock, Message, MessageHandler, PlayerId,
    WireFormat,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Message class produced by [`MarkerFormat`].
#[derive(Debug)]
struct MarkMessage {
    message_type: &'static str,
    payload: Vec<u8>,
}

impl Message for MarkMessage {
    fn message_type(&self) -> &str {
        self.message_type
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A second message class sharing type strings with [`MarkMessage`].
#[derive(Debug)]
struct AltMessage {
    message_type: &'static str,
}

impl Message for AltMessage {
    fn message_type(&self) -> &str {
        self.message_type
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Accepts any packet containing its marker byte; produces [`MarkMessage`].
struct MarkerFormat {
    name: &'static str,
    marker: u8,
    message_type: &'static str,
}

impl WireFormat for MarkerFormat {
    type Decoded = Vec<u8>;

    fn name(&self) -> &str {
        self.name
    }

    fn verify(&self, bytes: &[u8]) -> bool {
        bytes.contains(&self.marker)
    }

    fn try_decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeFailure> {
        if bytes.contains(&self.marker) {
            Ok(bytes.to_vec())
        } else {
            Err(DecodeFailure::mismatch())
        }
    }

    fn materialize(&self, decoded: Vec<u8>) -> Arc<dyn Message> {
        Arc::new(MarkMessage {
            message_type: self.message_type,
            payload: decoded,
        })
    }
}

/// Like [`MarkerFormat`] but produces [`AltMessage`].
struct AltMarkerFormat {
    name: &'static str,
    marker: u8,
    message_type: &'static str,
}

impl WireFormat for AltMarkerFormat {
    type Decoded = ();

    fn name(&self) -> &str {
        self.name
    }

    fn verify(&self, bytes: &[u8]) -> bool {
        bytes.contains(&self.marker)
    }

    fn try_decode(&self, bytes: &[u8]) -> Result<(), DecodeFailure> {
        if bytes.contains(&self.marker) {
            Ok(())
        } else {
            Err(DecodeFailure::mismatch())
        }
    }

    fn materialize(&self, _decoded: ()) -> Arc<dyn Message> {
        Arc::new(AltMessage {
            message_type: self.message_type,
        })
    }
}

/// Replies with a fixed byte sequence; expects [`MarkMessage`].
struct WriteBackHandler {
    message_type: &'static str,
    reply: Vec<u8>,
}

#[async_trait]
impl MessageHandler for WriteBackHandler {
    type Message = MarkMessage;

    fn message_type(&self) -> &str {
        self.message_type
    }

    async fn handle(
        &self,
        _message: &MarkMessage,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError> {
        ctx.send_raw(&self.reply, true, false).await
    }
}

/// Replies with a fixed byte sequence; expects [`AltMessage`].
struct AltWriteBackHandler {
    message_type: &'static str,
    reply: Vec<u8>,
}

#[async_trait]
impl MessageHandler for AltWriteBackHandler {
    type Message = AltMessage;

    fn message_type(&self) -> &str {
        self.message_type
    }

    async fn handle(
        &self,
        _message: &AltMessage,
        ctx: &HandlerContext,
    ) -> Result<(), DispatchError> {
        ctx.send_raw(&self.reply, true, false).await
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    }
}

/// Registers the marker formats and reply handlers shared by the routing
/// scenarios.
fn register_marker_suite(server: &GameServer) {
    let registry = server.format_registry();
    registry.register(Arc::new(MarkerFormat {
        name: "alpha",
        marker: b'a',
        message_type: "type1",
    }));
    registry.register(Arc::new(AltMarkerFormat {
        name: "bravo",
        marker: b'b',
        message_type: "type1",
    }));
    registry.register(Arc::new(MarkerFormat {
        name: "charlie",
        marker: b'c',
        message_type: "type2",
    }));

    let dispatcher = server.message_dispatcher();
    dispatcher
        .register(WriteBackHandler {
            message_type: "type1",
            reply: vec![5, 5, 5],
        })
        .unwrap();
    dispatcher
        .register(WriteBackHandler {
            message_type: "type2",
            reply: vec![6, 6, 6],
        })
        .unwrap();
    dispatcher
        .register(AltWriteBackHandler {
            message_type: "type3",
            reply: vec![7, 7, 7],
        })
        .unwrap();
}

async fn spawn_server(server: Arc<GameServer>) -> SocketAddr {
    let addr = server.bind().await.expect("bind failed");
    let runner = server.clone();
    tokio::spawn(async move {
        runner.start().await.expect("server run failed");
    });
    addr
}

async fn read_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .expect("read failed");
    buf
}

async fn assert_no_bytes(client: &mut TcpStream, wait: Duration) {
    let mut buf = [0u8; 16];
    let read = timeout(wait, client.read(&mut buf)).await;
    match read {
        Err(_) => {}                      // timed out: nothing arrived
        Ok(Ok(0)) => {}                   // clean close, still zero payload
        Ok(Ok(n)) => panic!("unexpected {n} bytes: {:?}", &buf[..n]),
        Ok(Err(e)) => panic!("read error while expecting silence: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn matching_format_routes_to_its_handler() {
    let server = Arc::new(GameServer::new(test_config()));
    register_marker_suite(&server);
    let addr = spawn_server(server.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"a12345").await.unwrap();

    assert_eq!(read_reply(&mut client, 3).await, vec![5, 5, 5]);
    assert_no_bytes(&mut client, Duration::from_millis(300)).await;

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_decode_picks_the_first_registered_format() {
    let server = Arc::new(GameServer::new(test_config()));
    register_marker_suite(&server);
    // second format on 'c' materializing a different class: both decode,
    // "charlie" was registered first and must win
    server.format_registry().register(Arc::new(AltMarkerFormat {
        name: "charlie-alt",
        marker: b'c',
        message_type: "type2",
    }));
    let addr = spawn_server(server.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"c12345").await.unwrap();

    assert_eq!(read_reply(&mut client, 3).await, vec![6, 6, 6]);
    assert_no_bytes(&mut client, Duration::from_millis(300)).await;

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecognized_packet_produces_no_reply() {
    let server = Arc::new(GameServer::new(test_config()));
    register_marker_suite(&server);
    let addr = spawn_server(server.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    // none of the marker bytes: falls back to the default format, whose
    // message has no registered handler
    client.write_all(b"wxyz0987").await.unwrap();

    assert_no_bytes(&mut client, Duration::from_millis(1500)).await;

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_handlers_both_reply_in_registration_order() {
    let server = Arc::new(GameServer::new(test_config()));
    server.format_registry().register(Arc::new(MarkerFormat {
        name: "alpha",
        marker: b'a',
        message_type: "type1",
    }));
    let dispatcher = server.message_dispatcher();
    dispatcher
        .register(WriteBackHandler {
            message_type: "type1",
            reply: vec![1],
        })
        .unwrap();
    dispatcher
        .register(WriteBackHandler {
            message_type: "type1",
            reply: vec![2],
        })
        .unwrap();
    let addr = spawn_server(server.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"a").await.unwrap();

    assert_eq!(read_reply(&mut client, 2).await, vec![1, 2]);

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_failure_terminates_only_its_connection() {
    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        type Message = MarkMessage;

        fn message_type(&self) -> &str {
            "type1"
        }

        async fn handle(
            &self,
            _message: &MarkMessage,
            _ctx: &HandlerContext,
        ) -> Result<(), DispatchError> {
            Err(DispatchError::HandlerExecution("boom".to_string()))
        }
    }

    let server = Arc::new(GameServer::new(test_config()));
    server.format_registry().register(Arc::new(MarkerFormat {
        name: "alpha",
        marker: b'a',
        message_type: "type1",
    }));
    server
        .message_dispatcher()
        .register(FailingHandler)
        .unwrap();
    let addr = spawn_server(server.clone()).await;

    let mut doomed = TcpStream::connect(addr).await.unwrap();
    doomed.write_all(b"a").await.unwrap();

    // the failing handler closes this connection
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), doomed.read(&mut buf))
        .await
        .expect("timed out waiting for close")
        .expect("read failed");
    assert_eq!(n, 0, "expected EOF after handler failure");

    // siblings are unaffected: a new connection still gets served
    let mut survivor = TcpStream::connect(addr).await.unwrap();
    survivor.write_all(b"zzz").await.unwrap();
    assert_no_bytes(&mut survivor, Duration::from_millis(300)).await;

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn identified_player_gets_offline_bookkeeping_on_disconnect() {
    /// Derives a player id from the packet payload and assigns it.
    struct IdentifyHandler;

    #[async_trait]
    impl MessageHandler for IdentifyHandler {
        type Message = MarkMessage;

        fn message_type(&self) -> &str {
            "type1"
        }

        async fn handle(
            &self,
            message: &MarkMessage,
            ctx: &HandlerContext,
        ) -> Result<(), DispatchError> {
            let suffix = String::from_utf8_lossy(&message.payload);
            let id = format!("pid-{}", suffix.trim_start_matches('a'));
            ctx.update_player_id(PlayerId::new(id)).await?;
            ctx.send_raw(b"ok", false, false).await
        }
    }

    let clock = ManualClock::shared(5_000);
    let players = Arc::new(InMemoryPlayerRegistry::new(clock.clone()));
    let server = Arc::new(GameServer::with_collaborators(
        test_config(),
        clock,
        players.clone(),
    ));
    server.format_registry().register(Arc::new(MarkerFormat {
        name: "alpha",
        marker: b'a',
        message_type: "type1",
    }));
    server
        .message_dispatcher()
        .register(IdentifyHandler)
        .unwrap();
    let addr = spawn_server(server.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"a77").await.unwrap();
    assert_eq!(read_reply(&mut client, 2).await, b"ok".to_vec());
    drop(client);

    let player = PlayerId::new("pid-77");
    let mut last_login = None;
    for _ in 0..50 {
        last_login = players.last_login(&player);
        if last_login.is_some() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(last_login, Some(5_000));
    assert!(!players.is_online(&player));
    assert_eq!(players.connection_context(&player), None);

    server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_idempotent_and_stops_the_server() {
    let server = Arc::new(GameServer::new(test_config()));
    let addr = server.bind().await.unwrap();
    let handle = {
        let runner = server.clone();
        tokio::spawn(async move { runner.start().await })
    };

    let _client = TcpStream::connect(addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    server.shutdown();
    server.shutdown();

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .expect("server task panicked");
    assert!(result.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_registered_on_the_server_handle_requests() {
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct AnnounceArgs {
        text: String,
        #[serde(default)]
        urgent: bool,
    }

    struct AnnounceCommand;

    #[async_trait]
    impl Command for AnnounceCommand {
        type Args = AnnounceArgs;

        fn name(&self) -> &str {
            "announce"
        }

        fn short_description(&self) -> &str {
            "Broadcast a server notice"
        }

        fn detailed_description(&self) -> &str {
            "Broadcasts the given text to every connected player"
        }

        fn completion_message(&self) -> &str {
            "notice sent"
        }

        fn arguments(&self) -> Vec<ArgumentInfo> {
            vec![
                ArgumentInfo::required("text", ArgumentKind::String, "notice text"),
                ArgumentInfo::optional(
                    "urgent",
                    ArgumentKind::Boolean,
                    serde_json::json!(false),
                    "interrupt gameplay",
                ),
            ]
        }

        async fn execute(
            &self,
            _ctx: &CommandContext,
            args: AnnounceArgs,
        ) -> anyhow::Result<CommandResult> {
            if args.text.is_empty() {
                return Ok(CommandResult::ExecutionFailure {
                    message: "empty notice".to_string(),
                });
            }
            Ok(CommandResult::Executed)
        }
    }

    let server = GameServer::new(test_config());
    let commands = server.command_dispatcher();
    commands.register(AnnounceCommand).unwrap();

    let ctx = CommandContext {
        issuer: "ops".to_string(),
    };
    let ok = commands
        .handle_command(
            &ctx,
            &CommandRequest {
                name: "announce".to_string(),
                args: serde_json::json!({"text": "maintenance at midnight"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            },
        )
        .await;
    assert_eq!(ok, CommandResult::Executed);

    let rejected = commands
        .handle_command(
            &ctx,
            &CommandRequest {
                name: "announce".to_string(),
                args: serde_json::json!({"text": ""}).as_object().cloned().unwrap(),
            },
        )
        .await;
    assert!(matches!(rejected, CommandResult::ExecutionFailure { .. }));
}

// ---------------------------------------------------------------------------
// Pipeline unit tests (paths TCP cannot exercise)
// ---------------------------------------------------------------------------

mod pipeline {
    use super::*;
    use crate::messaging::{process_packet, EMPTY_PACKET_TYPE};
    use meridian_message_system::{FormatRegistry, MessageDispatcher, RawSender};
    use std::future::Future;
    use std::pin::Pin;

    struct NullSender;

    impl RawSender for NullSender {
        fn send_raw(
            &self,
            _bytes: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn update_player_id(
            &self,
            _new_id: PlayerId,
        ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn empty_packet_returns_the_sentinel() {
        let registry = FormatRegistry::new();
        let dispatcher = MessageDispatcher::new();
        let sender: Arc<dyn RawSender> = Arc::new(NullSender);

        let result = process_packet(
            b"",
            &registry,
            &dispatcher,
            &PlayerId::undetermined(),
            &sender,
        )
        .await
        .unwrap();
        assert_eq!(result.as_deref(), Some(EMPTY_PACKET_TYPE));
    }

    #[tokio::test]
    async fn packet_nothing_decodes_is_dropped_without_dispatch() {
        /// Verifies eagerly but never decodes.
        struct TeaseFormat;

        impl WireFormat for TeaseFormat {
            type Decoded = ();

            fn name(&self) -> &str {
                "tease"
            }

            fn verify(&self, _bytes: &[u8]) -> bool {
                true
            }

            fn try_decode(&self, _bytes: &[u8]) -> Result<(), DecodeFailure> {
                Err(DecodeFailure::new("never decodes"))
            }

            fn materialize(&self, _decoded: ()) -> Arc<dyn Message> {
                unreachable!()
            }
        }

        let registry = FormatRegistry::new();
        registry.register(Arc::new(TeaseFormat));
        let dispatcher = MessageDispatcher::new();
        let sender: Arc<dyn RawSender> = Arc::new(NullSender);

        let result = process_packet(
            b"anything",
            &registry,
            &dispatcher,
            &PlayerId::undetermined(),
            &sender,
        )
        .await
        .unwrap();
        assert_eq!(result, None);
        assert_eq!(dispatcher.stats().messages_dispatched, 0);
    }

    #[tokio::test]
    async fn panicking_decode_is_contained() {
        struct ExplodingFormat;

        impl WireFormat for ExplodingFormat {
            type Decoded = ();

            fn name(&self) -> &str {
                "exploding"
            }

            fn verify(&self, _bytes: &[u8]) -> bool {
                true
            }

            fn try_decode(&self, _bytes: &[u8]) -> Result<(), DecodeFailure> {
                panic!("decoder bug");
            }

            fn materialize(&self, _decoded: ()) -> Arc<dyn Message> {
                unreachable!()
            }
        }

        let registry = FormatRegistry::new();
        registry.register(Arc::new(ExplodingFormat));
        registry.register(Arc::new(MarkerFormat {
            name: "alpha",
            marker: b'a',
            message_type: "type1",
        }));
        let dispatcher = MessageDispatcher::new();
        let sender: Arc<dyn RawSender> = Arc::new(NullSender);

        // the exploding format is skipped, the marker format still decodes
        let result = process_packet(
            b"abc",
            &registry,
            &dispatcher,
            &PlayerId::undetermined(),
            &sender,
        )
        .await
        .unwrap();
        assert_eq!(result.as_deref(), Some("type1"));
    }
}
