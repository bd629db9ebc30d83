//! End-to-end over TCP: real listener, world actor, bot and framed clients.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use agora::clock::SystemClock;
use agora::config::{Config, StorageBackend};
use agora::ids::UserId;
use agora::protocol::{
    encode_frame, ChatBody, ChatKind, ChatMessage, Framer, Packet, ProfileAction,
    ProfileActionKind, Side, UserInfoAction, WorldAction, WorldActionKind,
};
use agora::server::Server;
use agora::state::{ServerState, StateSettings};
use agora::storage::MemoryStore;
use agora::user::PasswordService;

use common::{cheap_security, harbor, PASSWORD};

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start(bot: bool) -> Running {
    let mut config = Config::default();
    config.owner = Some("root".into());
    config.server.bind = "127.0.0.1:0".into();
    config.storage.backend = StorageBackend::Memory;
    config.security = Some(cheap_security());
    config.session.tick_interval_ms = 50;
    config.bot.enabled = bot;

    let mut state = ServerState::new(
        StateSettings::from_config(&config),
        Box::new(MemoryStore::new()),
        Arc::new(SystemClock),
    )
    .with_passwords(PasswordService::from_config(config.security.as_ref()));
    for seed in &config.worlds {
        state.seed_world(&seed.name, seed.map).unwrap();
    }

    let server = Server::bind(&config, state).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(async {
        let _ = rx.await;
    }));
    Running { addr, stop, task }
}

struct Client {
    stream: TcpStream,
    framer: Framer,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            framer: Framer::new(64 * 1024),
        }
    }

    async fn send(&mut self, packet: impl Into<Packet>) {
        let frame = encode_frame(&packet.into().encode(), 512).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn send_raw(&mut self, payload: &[u8]) {
        let frame = encode_frame(payload, 512).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn next(&mut self) -> Packet {
        loop {
            if let Some(frame) = self.framer.next_frame().unwrap() {
                return Packet::decode_on(Side::Client, frame).unwrap();
            }
            let mut buf = [0u8; 4096];
            let n = timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for a packet")
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.framer.push(&buf[..n]);
        }
    }

    /// Skip packets until one matches.
    async fn wait_for<T>(&mut self, mut pick: impl FnMut(Packet) -> Option<T>) -> T {
        loop {
            if let Some(found) = pick(self.next().await) {
                return found;
            }
        }
    }

    async fn profile(&mut self, action: ProfileActionKind, name: &str) -> ProfileAction {
        let mut request = ProfileAction::request(action);
        request.name = Some(name.into());
        request.password = Some(PASSWORD.into());
        self.send(request).await;
        self.wait_for(|p| match p {
            Packet::ProfileAction(r) if r.action == action => Some(r),
            _ => None,
        })
        .await
    }

    async fn sign_in(&mut self, name: &str) -> UserId {
        let registered = self.profile(ProfileActionKind::Register, name).await;
        assert!(registered.success, "{:?}", registered.message);
        let login = self.profile(ProfileActionKind::Login, name).await;
        assert!(login.success, "{:?}", login.message);
        assert_eq!(login.password, None);
        login.user.unwrap()
    }

    async fn world(&mut self, action: WorldActionKind) -> WorldAction {
        let mut request = WorldAction::request(action);
        request.context = Some(harbor());
        self.send(request).await;
        self.wait_for(|p| match p {
            Packet::WorldAction(r) if r.action == action => Some(r),
            _ => None,
        })
        .await
    }

    /// Join and return the names on the world roster.
    async fn join(&mut self) -> Vec<String> {
        assert!(self.world(WorldActionKind::Join).await.success);
        self.wait_for(|p| match p {
            Packet::UserInfo(info)
                if info.action == UserInfoAction::Add && info.context == Some(harbor()) =>
            {
                Some(info.records.into_iter().filter_map(|r| r.name).collect())
            }
            _ => None,
        })
        .await
    }
}

fn say(text: &str) -> ChatMessage {
    ChatMessage {
        sender: None,
        kind: ChatKind::Standard,
        body: ChatBody::Text(text.into()),
        timestamp: None,
        image: None,
    }
}

async fn stop(server: Running) {
    let _ = server.stop.send(());
    timeout(WAIT, server.task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn chat_reaches_the_other_client_in_the_room() {
    let server = start(false).await;
    let mut ann = Client::connect(server.addr).await;
    let mut bob = Client::connect(server.addr).await;
    let ann_id = ann.sign_in("ann").await;
    bob.sign_in("bob").await;
    ann.join().await;
    let roster = bob.join().await;
    assert!(roster.contains(&"ann".to_string()));

    ann.send(say("hello harbor")).await;
    let heard = bob
        .wait_for(|p| match p {
            Packet::ChatMessage(m) if m.kind == ChatKind::Standard => Some(m),
            _ => None,
        })
        .await;
    assert_eq!(heard.sender, Some(ann_id));
    assert_eq!(heard.text(), Some("hello harbor"));
    assert!(heard.timestamp.is_some());

    stop(server).await;
}

#[tokio::test]
async fn anonymous_and_malformed_input_is_answered_not_fatal() {
    let server = start(false).await;
    let mut ann = Client::connect(server.addr).await;

    ann.send(say("anyone?")).await;
    let info = ann
        .wait_for(|p| match p {
            Packet::ChatMessage(m) if m.kind == ChatKind::Info => Some(m),
            _ => None,
        })
        .await;
    match info.body {
        ChatBody::Bundle(b) => assert_eq!(b.key, "error.not-authenticated"),
        other => panic!("unexpected body {other:?}"),
    }

    // unknown type byte, then a valid request on the same connection
    ann.send_raw(&[0x7F, 1, 2, 3]).await;
    ann.sign_in("ann").await;

    let mut again = ProfileAction::request(ProfileActionKind::Login);
    again.name = Some("ann".into());
    again.password = Some(PASSWORD.into());
    ann.send(again).await;
    let rejected = ann
        .wait_for(|p| match p {
            Packet::ProfileAction(r) if r.action == ProfileActionKind::Login => Some(r),
            _ => None,
        })
        .await;
    assert!(!rejected.success);
    assert_eq!(rejected.message.unwrap().key, "account.session-bound");
    assert_eq!(rejected.user, None);

    stop(server).await;
}

#[tokio::test]
async fn disconnecting_logs_the_user_out() {
    let server = start(false).await;
    let mut ann = Client::connect(server.addr).await;
    ann.sign_in("ann").await;
    ann.join().await;
    drop(ann);

    // the account can log in again once the old connection is gone
    let mut back = Client::connect(server.addr).await;
    let mut attempts = 0;
    loop {
        let login = back.profile(ProfileActionKind::Login, "ann").await;
        if login.success {
            break;
        }
        assert_eq!(login.message.unwrap().key, "account.already-online");
        attempts += 1;
        assert!(attempts < 50, "old session never ended");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    stop(server).await;
}

#[tokio::test]
async fn bot_welcomes_a_newcomer_by_name() {
    let server = start(true).await;
    let mut ann = Client::connect(server.addr).await;
    ann.sign_in("ann").await;

    // the bot may still be on its way in; rejoin until it was there first
    let mut attempts = 0;
    loop {
        let roster = ann.join().await;
        if roster.contains(&"Concierge".to_string()) {
            break;
        }
        assert!(ann.world(WorldActionKind::Leave).await.success);
        attempts += 1;
        assert!(attempts < 50, "bot never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let greeting = ann
        .wait_for(|p| match p {
            Packet::ChatMessage(m) if m.kind == ChatKind::Standard => Some(m),
            _ => None,
        })
        .await;
    assert_eq!(greeting.text(), Some("Welcome, ann!"));

    stop(server).await;
}
