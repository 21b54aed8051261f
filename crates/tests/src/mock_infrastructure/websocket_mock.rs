//! Websocket ledger endpoint answering `eth_subscribe` and pushing notifications on demand.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const SUBSCRIPTION_ID: &str = "0x9cef478923ff08bf67fde6c64013158d";

#[derive(Debug, Clone)]
enum ServerCommand {
    Send(String),
    CloseAll,
}

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    active: AtomicUsize,
    subscriptions: AtomicUsize,
    received: Mutex<Vec<String>>,
}

pub struct MockWebSocketServer {
    url: String,
    state: Arc<ServerState>,
    commands: broadcast::Sender<ServerCommand>,
    accept_task: JoinHandle<()>,
}

impl MockWebSocketServer {
    /// Binds to an ephemeral port. Every `eth_subscribe` is confirmed with
    /// [`SUBSCRIPTION_ID`].
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Like [`Self::start`], but subscription requests are left unanswered.
    pub async fn start_silent() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(confirm: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind websocket mock");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ServerState::default());
        let (commands, _) = broadcast::channel(64);

        let accept_state = state.clone();
        let accept_commands = commands.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                let commands = accept_commands.subscribe();
                tokio::spawn(handle_connection(stream, state, commands, confirm));
            }
        });

        Self { url: format!("ws://{addr}"), state, commands, accept_task }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.state.received.lock().await.clone()
    }

    /// Pushes one log to every connected client as an `eth_subscription` notification.
    pub fn push_log(&self, log: &Value) {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": { "subscription": SUBSCRIPTION_ID, "result": log }
        });
        self.send_raw(notification.to_string());
    }

    pub fn send_raw(&self, text: String) {
        let _ = self.commands.send(ServerCommand::Send(text));
    }

    /// Closes every open connection from the server side.
    pub fn close_all(&self) {
        let _ = self.commands.send(ServerCommand::CloseAll);
    }

    /// Polls until `n` subscriptions have been confirmed in total.
    pub async fn wait_for_subscriptions(&self, n: usize, timeout: Duration) -> bool {
        let state = self.state.clone();
        crate::mock_infrastructure::eventually(timeout, move || {
            state.subscriptions.load(Ordering::SeqCst) >= n
        })
        .await
    }

    /// Polls until `n` connections have been accepted in total.
    pub async fn wait_for_connections(&self, n: usize, timeout: Duration) -> bool {
        let state = self.state.clone();
        crate::mock_infrastructure::eventually(timeout, move || {
            state.connections.load(Ordering::SeqCst) >= n
        })
        .await
    }
}

impl Drop for MockWebSocketServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = self.commands.send(ServerCommand::CloseAll);
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    mut commands: broadcast::Receiver<ServerCommand>,
    confirm: bool,
) {
    let Ok(ws) = accept_async(stream).await else { return };
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.active.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(ServerCommand::Send(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(ServerCommand::CloseAll) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_string();
                    state.received.lock().await.push(text.clone());

                    let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                    if confirm && request["method"] == "eth_subscribe" {
                        let reply = json!({
                            "jsonrpc": "2.0",
                            "id": request["id"].clone(),
                            "result": SUBSCRIPTION_ID
                        });
                        if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                        state.subscriptions.fetch_add(1, Ordering::SeqCst);
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.active.fetch_sub(1, Ordering::SeqCst);
}
