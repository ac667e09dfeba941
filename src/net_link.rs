use crate::config::Config;
use crate::protocol::DeviceMessage;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

const MAX_RETRY_DELAY_SECS: u64 = 60;

#[derive(Debug)]
pub enum NetEvent {
    Text(String),
    Binary(Bytes),
    Connected,
    Disconnected,
}

#[derive(Debug)]
pub enum NetCommand {
    SendText(String),
    SendBinary(Bytes),
}

pub struct NetLink {
    config: Config,
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
    retry_delay: u64,
}

impl NetLink {
    pub fn new(config: Config, tx: mpsc::Sender<NetEvent>, rx_cmd: mpsc::Receiver<NetCommand>) -> Self {
        Self {
            config,
            tx,
            rx_cmd,
            retry_delay: 1,
        }
    }

    // 断线后按指数退避重连，直到命令通道关闭
    pub async fn run(mut self) {
        loop {
            match self.connect_and_loop().await {
                Ok(()) => {
                    log::info!("Command channel closed, NetLink exiting");
                    break;
                }
                Err(e) => {
                    log::warn!("Connection error: {}. Retrying in {}s...", e, self.retry_delay);
                    let _ = self.tx.send(NetEvent::Disconnected).await;
                    tokio::time::sleep(tokio::time::Duration::from_secs(self.retry_delay)).await;
                    self.retry_delay = next_retry_delay(self.retry_delay);
                }
            }
        }
    }

    // 进入连接和主循环，处理WebSocket消息和发送命令
    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        let url = Url::parse(self.config.ws_url)?;
        let host = url.host_str().unwrap_or("localhost");

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(self.config.ws_url)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .header("Device-Id", &self.config.device_id)
            .header("Client-Id", &self.config.client_id)
            .body(())?;

        log::info!("Connecting to {}...", self.config.ws_url);
        log::debug!("Headers: {:?}", request.headers());
        let (ws_stream, _) = connect_async(request).await?;
        log::info!("Connected!");
        self.retry_delay = 1;

        let (mut write, mut read) = ws_stream.split();

        self.tx.send(NetEvent::Connected).await?;

        // 连接建立后先发送init消息
        let init_json = DeviceMessage::init(self.config.app_name).to_json()?;
        log::debug!("Sending init: {}", init_json);
        write.send(Message::Text(init_json.into())).await?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            log::debug!("Received Text: {}", text);
                            self.tx.send(NetEvent::Text(text.to_string())).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.tx.send(NetEvent::Binary(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            return Err(anyhow::anyhow!("Connection closed"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(anyhow::anyhow!("Connection closed")),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendText(text)) => {
                            write.send(Message::Text(text.into())).await?;
                        }
                        Some(NetCommand::SendBinary(data)) => {
                            write.send(Message::Binary(data)).await?;
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = write.send(Message::Close(None)).await;
        Ok(())
    }
}

fn next_retry_delay(current: u64) -> u64 {
    std::cmp::min(current * 2, MAX_RETRY_DELAY_SECS)
}
