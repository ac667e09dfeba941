use mac_address::get_mac_address;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::audio::{OverflowPolicy, PipelineConfig};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 音频格式
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,

    // 缓冲与批处理
    pub block_size: usize,
    pub channel_capacity: usize,
    pub batch_capacity: usize,
    pub batch_timeout_ms: u64,

    // 各阶段超时
    pub push_timeout_ms: u64,
    pub pop_timeout_ms: u64,
    pub idle_delay_ms: u64,
    pub drain_delay_ms: u64,
    pub feed_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub overflow_policy: OverflowPolicy,

    // ALSA 设备
    pub capture_device: &'static str,
    pub playback_device: &'static str,

    // 网络配置（静态部分）
    pub ws_url: &'static str,

    // 设备标识（动态部分，可在运行时修改）
    pub device_id: String,
    pub client_id: String,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            sample_rate: env!("AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_RATE")?,
            bits_per_sample: env!("AUDIO_BITS_PER_SAMPLE").parse()
                .map_err(|_| "Failed to parse AUDIO_BITS_PER_SAMPLE")?,
            channels: env!("AUDIO_CHANNELS").parse()
                .map_err(|_| "Failed to parse AUDIO_CHANNELS")?,

            block_size: env!("AUDIO_BLOCK_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_BLOCK_SIZE")?,
            channel_capacity: env!("AUDIO_CHANNEL_CAPACITY").parse()
                .map_err(|_| "Failed to parse AUDIO_CHANNEL_CAPACITY")?,
            batch_capacity: env!("AUDIO_BATCH_CAPACITY").parse()
                .map_err(|_| "Failed to parse AUDIO_BATCH_CAPACITY")?,
            batch_timeout_ms: env!("AUDIO_BATCH_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_BATCH_TIMEOUT_MS")?,

            push_timeout_ms: env!("AUDIO_PUSH_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_PUSH_TIMEOUT_MS")?,
            pop_timeout_ms: env!("AUDIO_POP_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_POP_TIMEOUT_MS")?,
            idle_delay_ms: env!("AUDIO_IDLE_DELAY_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_IDLE_DELAY_MS")?,
            drain_delay_ms: env!("AUDIO_DRAIN_DELAY_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_DRAIN_DELAY_MS")?,
            feed_timeout_ms: env!("AUDIO_FEED_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_FEED_TIMEOUT_MS")?,
            stop_timeout_ms: env!("AUDIO_STOP_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse AUDIO_STOP_TIMEOUT_MS")?,
            overflow_policy: env!("AUDIO_OVERFLOW_POLICY").parse()
                .map_err(|_| "Failed to parse AUDIO_OVERFLOW_POLICY")?,

            capture_device: env!("AUDIO_CAPTURE_DEVICE"),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE"),

            ws_url: env!("WS_URL"),

            // 设备标识初始化为config.toml中的值
            device_id: env!("DEVICE_ID").to_string(),
            client_id: env!("CLIENT_ID").to_string(),
        })
    }

    /// Runtime pipeline settings derived from the build-time values.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            channels: self.channels,
            block_size: self.block_size,
            channel_capacity: self.channel_capacity,
            batch_capacity: self.batch_capacity,
            batch_timeout: Duration::from_millis(self.batch_timeout_ms),
            push_timeout: Duration::from_millis(self.push_timeout_ms),
            pop_timeout: Duration::from_millis(self.pop_timeout_ms),
            idle_delay: Duration::from_millis(self.idle_delay_ms),
            drain_delay: Duration::from_millis(self.drain_delay_ms),
            feed_timeout: Duration::from_millis(self.feed_timeout_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            overflow_policy: self.overflow_policy,
        }
    }

    /// 补全设备标识：device_id 取 MAC 地址（失败时用随机 UUID），
    /// client_id 从本地文件读取以保持重启间一致，不存在则生成并保存。
    pub fn resolve_identity(&mut self, client_id_path: &str) {
        if self.device_id == UNKNOWN_DEVICE {
            self.device_id = match get_mac_address() {
                Ok(Some(mac)) => mac.to_string().to_lowercase(),
                _ => Uuid::new_v4().to_string(),
            };
            log::info!("Device ID: {}", self.device_id);
        }

        if self.client_id != UNKNOWN_CLIENT {
            return;
        }
        if let Ok(content) = std::fs::read_to_string(client_id_path) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                self.client_id = trimmed.to_string();
                log::info!("Loaded Client ID from file: {}", self.client_id);
                return;
            }
        }
        self.client_id = Uuid::new_v4().to_string();
        log::info!("Generated new Client ID: {}", self.client_id);
        if let Err(e) = std::fs::write(client_id_path, &self.client_id) {
            log::warn!("Failed to save Client ID to {}: {}", client_id_path, e);
        }
    }
}

const UNKNOWN_DEVICE: &str = "unknown-device";
const UNKNOWN_CLIENT: &str = "unknown-client";

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
