//! JSON signalling exchanged with the server over the WebSocket text channel.
//!
//! Audio travels separately as binary messages: outbound frames carry the
//! `AUDIO:` tag, inbound binary is raw PCM for playback.

use serde::{Deserialize, Serialize};

use crate::audio::PipelineEvent;

/// 服务器下发的控制指令
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ControlMessage {
    StartRecording,
    StopRecording,
    StartPlaying,
    StopPlaying,
}

impl ControlMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// 设备上报给服务器的消息
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// 连接建立后的第一条消息
    Init { device: String },
    RecordingStarted,
    RecordingSent,
    RecordingStopped,
    PlaybackStarted,
    PlaybackStopped,
    NoAudioData,
}

impl DeviceMessage {
    pub fn init(device: impl Into<String>) -> Self {
        DeviceMessage::Init {
            device: device.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<PipelineEvent> for DeviceMessage {
    fn from(event: PipelineEvent) -> Self {
        match event {
            PipelineEvent::RecordingStarted => DeviceMessage::RecordingStarted,
            PipelineEvent::RecordingSent => DeviceMessage::RecordingSent,
            PipelineEvent::RecordingStopped => DeviceMessage::RecordingStopped,
            PipelineEvent::PlaybackStarted => DeviceMessage::PlaybackStarted,
            PipelineEvent::PlaybackStopped => DeviceMessage::PlaybackStopped,
            PipelineEvent::NoAudioData => DeviceMessage::NoAudioData,
        }
    }
}
