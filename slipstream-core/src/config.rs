//! Centralized configuration for a Slipstream run.
//!
//! All tunable parameters are defined here and passed explicitly through the
//! sequencer; nested components never read configuration implicitly. This
//! replaces the embedded host/port/path literals a quick test script would
//! carry.

use std::path::PathBuf;
use std::time::Duration;

use crate::tracing_setup::LogVerbosity;

/// Central configuration for a single harness run.
///
/// Groups related settings into logical sections. Supplied once at startup
/// and never mutated during the run. Supports environment variable overrides
/// for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub relay: RelayConfig,
    pub media: MediaSourceConfig,
    pub pipeline: PipelineConfig,
    pub programs: ProgramConfig,
}

/// Relay endpoint the publisher and subscribers connect to.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// URL scheme for the connect URL
    pub scheme: &'static str,
    /// Relay host or IP
    pub host: String,
    /// Relay listen port
    pub port: u16,
    /// Endpoint path on the relay
    pub endpoint: String,
    /// When set, this harness launches the relay itself over SSH.
    /// When `None`, a relay is assumed to be pre-provisioned externally.
    pub launch: Option<RelayLaunch>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scheme: "https",
            host: "127.0.0.1".to_string(),
            port: 4433,
            endpoint: "/moq".to_string(),
            launch: None,
        }
    }
}

impl RelayConfig {
    /// Returns the URL the publisher and subscribers connect to.
    pub fn connect_url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.endpoint)
    }
}

/// Parameters for launching the relay server on a remote host.
#[derive(Debug, Clone)]
pub struct RelayLaunch {
    /// SSH target, e.g. `user@relay-host`
    pub ssh_target: String,
    /// Relay server binary path on the remote host
    pub relay_bin: PathBuf,
    /// TLS certificate path on the remote host
    pub cert: PathBuf,
    /// TLS private key path on the remote host
    pub key: PathBuf,
}

impl RelayLaunch {
    /// Creates launch parameters for the given SSH target with the default
    /// remote binary and certificate layout.
    pub fn new(ssh_target: impl Into<String>) -> Self {
        Self {
            ssh_target: ssh_target.into(),
            relay_bin: PathBuf::from("./_build/moxygen/relay/moqrelayserver"),
            cert: PathBuf::from("./certs/certificate.pem"),
            key: PathBuf::from("./certs/certificate.key"),
        }
    }
}

/// Encoding parameters for the generated test stream.
///
/// The media source renders SMPTE color bars with a sine tone and a
/// wall-clock timestamp overlay, so a human can eyeball latency and frame
/// drops in the captured outputs.
#[derive(Debug, Clone)]
pub struct MediaSourceConfig {
    /// Length of the generated stream
    pub duration: Duration,
    /// Video frame size, e.g. "320x200"
    pub resolution: &'static str,
    /// Video frame rate
    pub frame_rate: u32,
    /// Video bitrate, e.g. "180k"
    pub video_bitrate: &'static str,
    /// Audio bitrate, e.g. "96k"
    pub audio_bitrate: &'static str,
    /// Frequency of the generated audio tone in Hz
    pub tone_frequency: u32,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Keyframe interval in frames
    pub keyframe_interval: u32,
    /// Font used for the timestamp overlay
    pub font_file: PathBuf,
}

impl Default for MediaSourceConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(300), // 5 minutes
            resolution: "320x200",
            frame_rate: 30,
            video_bitrate: "180k",
            audio_bitrate: "96k",
            tone_frequency: 1000,
            sample_rate: 48000,
            keyframe_interval: 60, // one keyframe every 2s at 30 fps
            font_file: PathBuf::from("/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf"),
        }
    }
}

/// Sequencing, fan-out, and teardown parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Named pipe between the media source and the publisher.
    /// A leading `~` is expanded to the user's home directory.
    pub pipe_path: PathBuf,
    /// Number of subscriber processes to fan out
    pub subscriber_count: usize,
    /// Directory for captured subscriber outputs
    pub output_dir: PathBuf,
    /// Directory for per-subscriber stats logs
    pub log_dir: PathBuf,
    /// Wait after launching the relay before starting the media source
    pub relay_startup_delay: Duration,
    /// Wait after starting the media source before starting the publisher
    pub source_startup_delay: Duration,
    /// How long a terminated process may take to exit before it is killed
    pub termination_grace: Duration,
    /// Verbosity handed to the external client binaries via `--logging`
    pub client_logging: LogVerbosity,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipe_path: PathBuf::from("~/Movies/fifo.flv"),
            subscriber_count: 10,
            output_dir: PathBuf::from("~/Movies"),
            log_dir: PathBuf::from("."),
            relay_startup_delay: Duration::from_secs(2),
            source_startup_delay: Duration::from_secs(1),
            termination_grace: Duration::from_secs(5),
            client_logging: LogVerbosity::Debug,
        }
    }
}

/// Paths of the external executables the harness drives.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    /// Transcoder generating the test stream
    pub ffmpeg: PathBuf,
    /// Container prober used by the output validator
    pub ffprobe: PathBuf,
    /// Remote-execution channel for the relay launch
    pub ssh: PathBuf,
    /// Publisher client reading the pipe and streaming to the relay
    pub publisher: PathBuf,
    /// Subscriber client capturing the relayed stream to a file
    pub subscriber: PathBuf,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            ssh: PathBuf::from("ssh"),
            publisher: PathBuf::from(
                "./_build/moxygen/samples/flv_streamer_client/moqflvstreamerclient",
            ),
            subscriber: PathBuf::from(
                "./_build/moxygen/samples/flv_receiver_client/moqflvreceiverclient",
            ),
        }
    }
}

impl HarnessConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via `SLIPSTREAM_*` variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("SLIPSTREAM_RELAY_HOST") {
            config.relay.host = host;
        }

        if let Ok(port) = std::env::var("SLIPSTREAM_RELAY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.relay.port = port;
            }
        }

        if let Ok(count) = std::env::var("SLIPSTREAM_SUBSCRIBERS") {
            if let Ok(count) = count.parse::<usize>() {
                config.pipeline.subscriber_count = count;
            }
        }

        if let Ok(path) = std::env::var("SLIPSTREAM_PIPE_PATH") {
            config.pipeline.pipe_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("SLIPSTREAM_OUTPUT_DIR") {
            config.pipeline.output_dir = PathBuf::from(dir);
        }

        config
    }

    /// Creates a configuration optimized for tests: tiny startup delays, a
    /// short termination grace, and a small fan-out.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.pipeline.subscriber_count = 3;
        config.pipeline.relay_startup_delay = Duration::from_millis(10);
        config.pipeline.source_startup_delay = Duration::from_millis(10);
        config.pipeline.termination_grace = Duration::from_millis(500);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = HarnessConfig::default();

        assert_eq!(config.relay.host, "127.0.0.1");
        assert_eq!(config.relay.port, 4433);
        assert!(config.relay.launch.is_none());
        assert_eq!(config.pipeline.subscriber_count, 10);
        assert_eq!(config.pipeline.pipe_path, PathBuf::from("~/Movies/fifo.flv"));
        assert_eq!(config.pipeline.source_startup_delay, Duration::from_secs(1));
        assert_eq!(config.media.duration, Duration::from_secs(300));
        assert_eq!(config.programs.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_connect_url_rendering() {
        let mut relay = RelayConfig::default();
        relay.host = "192.168.221.128".to_string();

        assert_eq!(relay.connect_url(), "https://192.168.221.128:4433/moq");
    }

    #[test]
    fn test_relay_launch_defaults() {
        let launch = RelayLaunch::new("user@relay-host");

        assert_eq!(launch.ssh_target, "user@relay-host");
        assert_eq!(launch.cert, PathBuf::from("./certs/certificate.pem"));
        assert_eq!(launch.key, PathBuf::from("./certs/certificate.key"));
    }

    #[test]
    fn test_testing_preset_shrinks_delays() {
        let config = HarnessConfig::for_testing();

        assert_eq!(config.pipeline.subscriber_count, 3);
        assert!(config.pipeline.source_startup_delay < Duration::from_millis(100));
        assert!(config.pipeline.termination_grace <= Duration::from_secs(1));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SLIPSTREAM_RELAY_HOST", "10.0.0.7");
            std::env::set_var("SLIPSTREAM_RELAY_PORT", "4444");
            std::env::set_var("SLIPSTREAM_SUBSCRIBERS", "4");
            std::env::set_var("SLIPSTREAM_PIPE_PATH", "/tmp/slipstream.flv");
        }

        let config = HarnessConfig::from_env();

        assert_eq!(config.relay.host, "10.0.0.7");
        assert_eq!(config.relay.port, 4444);
        assert_eq!(config.pipeline.subscriber_count, 4);
        assert_eq!(config.pipeline.pipe_path, PathBuf::from("/tmp/slipstream.flv"));

        // Cleanup
        unsafe {
            std::env::remove_var("SLIPSTREAM_RELAY_HOST");
            std::env::remove_var("SLIPSTREAM_RELAY_PORT");
            std::env::remove_var("SLIPSTREAM_SUBSCRIBERS");
            std::env::remove_var("SLIPSTREAM_PIPE_PATH");
        }
    }
}
