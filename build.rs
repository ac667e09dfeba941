use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    network: Network,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    sample_rate: u32,
    bits_per_sample: u16,
    channels: u16,
    block_size: usize,
    channel_capacity: usize,
    batch_capacity: usize,
    batch_timeout_ms: u64,
    push_timeout_ms: u64,
    pop_timeout_ms: u64,
    idle_delay_ms: u64,
    drain_delay_ms: u64,
    feed_timeout_ms: u64,
    stop_timeout_ms: u64,
    overflow_policy: String,
    capture_device: String,
    playback_device: String,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    device_id: String,
    client_id: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_BITS_PER_SAMPLE={}", config.audio.bits_per_sample);
    println!("cargo:rustc-env=AUDIO_CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=AUDIO_BLOCK_SIZE={}", config.audio.block_size);
    println!("cargo:rustc-env=AUDIO_CHANNEL_CAPACITY={}", config.audio.channel_capacity);
    println!("cargo:rustc-env=AUDIO_BATCH_CAPACITY={}", config.audio.batch_capacity);
    println!("cargo:rustc-env=AUDIO_BATCH_TIMEOUT_MS={}", config.audio.batch_timeout_ms);
    println!("cargo:rustc-env=AUDIO_PUSH_TIMEOUT_MS={}", config.audio.push_timeout_ms);
    println!("cargo:rustc-env=AUDIO_POP_TIMEOUT_MS={}", config.audio.pop_timeout_ms);
    println!("cargo:rustc-env=AUDIO_IDLE_DELAY_MS={}", config.audio.idle_delay_ms);
    println!("cargo:rustc-env=AUDIO_DRAIN_DELAY_MS={}", config.audio.drain_delay_ms);
    println!("cargo:rustc-env=AUDIO_FEED_TIMEOUT_MS={}", config.audio.feed_timeout_ms);
    println!("cargo:rustc-env=AUDIO_STOP_TIMEOUT_MS={}", config.audio.stop_timeout_ms);
    println!("cargo:rustc-env=AUDIO_OVERFLOW_POLICY={}", config.audio.overflow_policy);
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=DEVICE_ID={}", config.network.device_id);
    println!("cargo:rustc-env=CLIENT_ID={}", config.network.client_id);
}
