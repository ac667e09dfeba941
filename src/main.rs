use bytes::Bytes;
use reception_audio::audio::{AlsaHardware, PipelineController, PipelineEvent};
use reception_audio::config::Config;
use reception_audio::net_link::{NetCommand, NetEvent, NetLink};
use reception_audio::protocol::{ControlMessage, DeviceMessage};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

const CLIENT_ID_FILE: &str = "reception_uuid.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().unwrap_or_default();
    config.resolve_identity(CLIENT_ID_FILE);
    log::info!("{} v{} starting", config.app_name, config.app_version);

    // 网络事件与命令通道
    let (tx_net_event, mut rx_net_event) = mpsc::channel::<NetEvent>(100);
    let (tx_net_cmd, rx_net_cmd) = mpsc::channel::<NetCommand>(100);

    // 音频帧与音频事件通道
    let (tx_frame, mut rx_frame) = mpsc::channel::<Bytes>(64);
    let (tx_audio_event, mut rx_audio_event) = mpsc::channel::<PipelineEvent>(32);

    // 启动音频管线，失败时设备继续运行，只是没有音频
    let mut controller = PipelineController::new(config.pipeline_config(), Arc::new(tx_audio_event));
    let hardware = AlsaHardware {
        capture_device: config.capture_device.to_string(),
        playback_device: config.playback_device.to_string(),
    };
    if let Err(e) = controller.begin(&hardware, Box::new(tx_frame)) {
        log::error!("Continuing without audio: {}", e);
    }
    let controller = Arc::new(controller);

    // 启动网络链接
    let net_link = NetLink::new(config.clone(), tx_net_event, rx_net_cmd);
    tokio::spawn(async move {
        net_link.run().await;
    });

    log::info!("Reception audio started");

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(event) = rx_net_event.recv() => {
                match event {
                    NetEvent::Text(text) => match ControlMessage::parse(&text) {
                        Ok(msg) => {
                            log::info!("Received event: {:?}", msg);
                            // 停止操作会等待任务挂起，不能阻塞异步运行时的其他任务
                            let controller = controller.clone();
                            tokio::task::block_in_place(move || handle_control(&controller, msg));
                        }
                        Err(e) => log::warn!("Ignoring server message {}: {}", text, e),
                    },
                    NetEvent::Binary(data) => {
                        log::debug!("Received audio from server: {} bytes", data.len());
                        let controller = controller.clone();
                        tokio::task::block_in_place(move || controller.feed_playback_data(&data));
                    }
                    NetEvent::Connected => log::info!("WebSocket Connected"),
                    NetEvent::Disconnected => log::warn!("WebSocket Disconnected"),
                }
            }

            // 麦克风音频帧转发给服务器
            Some(frame) = rx_frame.recv() => {
                if let Err(e) = tx_net_cmd.try_send(NetCommand::SendBinary(frame)) {
                    log::warn!("Failed to queue audio frame: {}", e);
                }
            }

            // 管线事件上报给服务器
            Some(event) = rx_audio_event.recv() => {
                match DeviceMessage::from(event).to_json() {
                    Ok(json) => {
                        if let Err(e) = tx_net_cmd.send(NetCommand::SendText(json)).await {
                            log::error!("Failed to send event to NetLink: {}", e);
                        }
                    }
                    Err(e) => log::error!("Failed to encode {:?}: {}", event, e),
                }
            }
        }
    }

    match serde_json::to_string(&controller.stats()) {
        Ok(stats) => log::info!("Audio stats at exit: {}", stats),
        Err(e) => log::warn!("Failed to encode audio stats: {}", e),
    }
    Ok(())
}

fn handle_control(controller: &PipelineController, msg: ControlMessage) {
    let result = match msg {
        ControlMessage::StartRecording => controller.start_recording(),
        ControlMessage::StopRecording => controller.stop_recording(),
        ControlMessage::StartPlaying => controller.start_playback(),
        ControlMessage::StopPlaying => controller.stop_playback(),
    };
    if let Err(e) = result {
        log::warn!("{:?} failed: {}", msg, e);
    }
}
